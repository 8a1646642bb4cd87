use url::{ParseError, Url};
use uuid::Uuid;

/// Convenience wrapper for URL generation functions.
#[derive(Clone, Debug)]
pub struct Urls {
    /// Top-level URL, including trailing slash.
    base: Url,

    /// Path segments all bhajan routes are served under.
    pub(crate) bhajans_path: Vec<String>,
}

impl Urls {
    /// Creates a new instance. Routes are served under
    /// `api/<route_prefix>/` relative to `base`.
    pub fn new(base: Url, route_prefix: impl AsRef<str>) -> Self {
        let bhajans_path = std::iter::once("api")
            .chain(route_prefix.as_ref().split('/'))
            .filter(|segment| !segment.is_empty())
            .map(str::to_owned)
            .collect();

        Urls { base, bhajans_path }
    }

    pub fn bhajans(&self) -> Result<Url, ParseError> {
        self.base.join(&format!("{}/", self.bhajans_path.join("/")))
    }

    pub fn bhajan(&self, id: &Uuid) -> Result<Url, ParseError> {
        self.bhajans()?.join(&id.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bhajan_urls_sit_under_the_prefix() {
        let base = Url::parse("https://api.example.com/").unwrap();
        let urls = Urls::new(base, "/devotional/bhajan/");
        let id = Uuid::new_v4();

        assert_eq!(urls.bhajans_path, vec!["api", "devotional", "bhajan"]);
        assert_eq!(
            urls.bhajan(&id).unwrap().as_str(),
            format!("https://api.example.com/api/devotional/bhajan/{}", id)
        );
    }
}
