//! Build-time identification of the running service.

pub const NAME: &str = "bhajan-service";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const REVISION: Option<&str> = option_env!("BHAJAN_REVISION");

pub const BUILD_TIMESTAMP: Option<&str> = option_env!("BHAJAN_BUILD_TIMESTAMP");
