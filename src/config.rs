use std::env;
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::io::UploadLimits;

const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const DEFAULT_PORT: u16 = 3003;
const DEFAULT_ROUTE_PREFIX: &str = "bhajan";
const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
const DEFAULT_MAX_FILES: usize = 3;
const DEFAULT_UPLOAD_TIMEOUT_SECONDS: u64 = 120;
const DEFAULT_DELETE_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_ACL: &str = "public-read";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("must define {0} environment variable")]
    Missing(&'static str),

    #[error("could not parse {name}={value:?}: {message}")]
    Invalid {
        name: &'static str,
        value: String,
        message: String,
    },
}

/// Everything the service reads from its environment.
#[derive(Clone, Debug)]
pub struct Settings {
    pub host: IpAddr,
    pub port: u16,

    /// Public URL of the service, with trailing slash.
    pub base_url: Url,

    /// Routes are served under `/api/<route_prefix>`.
    pub route_prefix: String,

    pub db_connection_string: String,
    pub limits: UploadLimits,
    pub upload_timeout: Duration,
    pub delete_timeout: Duration,
    pub s3: S3Settings,
}

#[derive(Clone, Debug)]
pub struct S3Settings {
    pub access_key: String,
    pub secret_access_key: String,
    pub region_name: String,
    pub endpoint: String,
    pub bucket: String,
    pub acl: String,
    pub cache_control: Option<String>,

    /// Public URL objects are served from, with trailing slash.
    pub base_url: Url,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Settings::from_lookup(|name| env::var(name).ok())
    }

    /// Reads settings through `lookup`, which returns the value of the
    /// named variable if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let variables = Variables { lookup };

        let s3 = S3Settings {
            access_key: variables.required("S3_ACCESS_KEY")?,
            secret_access_key: variables.required("S3_SECRET_ACCESS_KEY")?,
            region_name: variables.required("S3_REGION_NAME")?,
            endpoint: variables.required("S3_ENDPOINT")?,
            bucket: variables.required("S3_BUCKET_NAME")?,
            acl: variables
                .optional("BHAJAN_S3_ACL")
                .unwrap_or_else(|| DEFAULT_ACL.to_owned()),
            cache_control: variables.optional("BHAJAN_S3_CACHE_CONTROL"),
            base_url: variables.directory_url("S3_BASE_URL")?,
        };

        let limits = UploadLimits {
            max_file_size: variables.parsed_or("BHAJAN_MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?,
            max_files: variables.parsed_or("BHAJAN_MAX_FILES", DEFAULT_MAX_FILES)?,
        };

        Ok(Settings {
            host: variables.parsed_or("BHAJAN_HOST", DEFAULT_HOST)?,
            port: variables.parsed_or("BHAJAN_PORT", DEFAULT_PORT)?,
            base_url: variables.directory_url("BHAJAN_BASE_URL")?,
            route_prefix: variables
                .optional("BHAJAN_ROUTE_PREFIX")
                .map(|prefix| prefix.trim_matches('/').to_owned())
                .unwrap_or_else(|| DEFAULT_ROUTE_PREFIX.to_owned()),
            db_connection_string: variables.required("BHAJAN_DB_CONNECTION_STRING")?,
            limits,
            upload_timeout: Duration::from_secs(variables.parsed_or(
                "BHAJAN_UPLOAD_TIMEOUT_SECONDS",
                DEFAULT_UPLOAD_TIMEOUT_SECONDS,
            )?),
            delete_timeout: Duration::from_secs(variables.parsed_or(
                "BHAJAN_DELETE_TIMEOUT_SECONDS",
                DEFAULT_DELETE_TIMEOUT_SECONDS,
            )?),
            s3,
        })
    }
}

struct Variables<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Variables<F> {
    /// Blank values count as unset.
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn parsed_or<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(name) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                message: e.to_string(),
                value,
            }),
        }
    }

    /// A URL that other paths are joined onto, so it must end in a slash.
    fn directory_url(&self, name: &'static str) -> Result<Url, ConfigError> {
        let mut value = self.required(name)?;
        if !value.ends_with('/') {
            value.push('/');
        }

        Url::parse(&value).map_err(|e| ConfigError::Invalid {
            name,
            message: e.to_string(),
            value,
        })
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    fn minimal() -> HashMap<&'static str, &'static str> {
        vec![
            ("BHAJAN_BASE_URL", "https://api.example.com"),
            ("BHAJAN_DB_CONNECTION_STRING", "postgres://localhost/bhajans"),
            ("S3_ACCESS_KEY", "key"),
            ("S3_SECRET_ACCESS_KEY", "secret"),
            ("S3_REGION_NAME", "in-west-1"),
            ("S3_ENDPOINT", "https://s3.example.com"),
            ("S3_BUCKET_NAME", "bhajans"),
            ("S3_BASE_URL", "https://media.example.com/bhajans"),
        ]
        .into_iter()
        .collect()
    }

    fn settings(variables: &HashMap<&'static str, &'static str>) -> Result<Settings, ConfigError> {
        Settings::from_lookup(|name| variables.get(name).map(|value| value.to_string()))
    }

    #[test]
    fn defaults_are_applied() {
        let settings = settings(&minimal()).expect("read settings");

        assert_eq!(settings.port, 3003);
        assert_eq!(settings.host.to_string(), "0.0.0.0");
        assert_eq!(settings.route_prefix, "bhajan");
        assert_eq!(settings.limits.max_file_size, 104_857_600);
        assert_eq!(settings.limits.max_files, 3);
        assert_eq!(settings.upload_timeout, Duration::from_secs(120));
        assert_eq!(settings.delete_timeout, Duration::from_secs(30));
        assert_eq!(settings.s3.acl, "public-read");
        assert_eq!(settings.s3.cache_control, None);
        assert_eq!(settings.base_url.as_str(), "https://api.example.com/");
        assert_eq!(settings.s3.base_url.as_str(), "https://media.example.com/bhajans/");
    }

    #[test]
    fn missing_variables_are_named() {
        let mut variables = minimal();
        variables.remove("S3_BUCKET_NAME");

        assert!(matches!(
            settings(&variables),
            Err(ConfigError::Missing("S3_BUCKET_NAME"))
        ));
    }

    #[test]
    fn unparsable_variables_are_rejected() {
        let mut variables = minimal();
        variables.insert("BHAJAN_MAX_FILES", "three");

        match settings(&variables) {
            Err(ConfigError::Invalid { name, value, .. }) => {
                assert_eq!(name, "BHAJAN_MAX_FILES");
                assert_eq!(value, "three");
            }
            other => panic!("expected an invalid variable, got {:?}", other),
        }
    }
}
