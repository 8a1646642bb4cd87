use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SuccessResponse<'a> {
    Deleted {
        message: &'a str,
        id: String,
    },
    Health {
        status: &'a str,
        timestamp: i64,

        /// Seconds since the service started.
        uptime: f64,

        version: &'a str,
        revision: Option<&'a str>,
    },
}
