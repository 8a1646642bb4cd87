use std::time::{Duration, Instant};

use log::{debug, error};
use time::OffsetDateTime;
use warp::{
    filters::multipart::FormData,
    http::StatusCode,
    reject,
    reply::{json, with_header, with_status, Reply},
};

use crate::environment::Environment;
use crate::errors::BackendError;
use crate::io::parse_submission;
use crate::routes::{
    rejection::{Context, Rejection},
    response::SuccessResponse,
};

const SERVER_TIMING_HEADER: &str = "server-timing";
const DELETED_MESSAGE: &str = "Bhajan deleted successfully";

type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($($expression:stmt);+) => {
        let start = Instant::now();

        // TODO when `try` blocks are stabilized, we can wrap the body
        // and return the headers even on errors
        let result = { $($expression)+ };

        Ok(Box::new(with_header(
            result,
            SERVER_TIMING_HEADER,
            format_server_timing(start.elapsed()),
        )) as Box<dyn Reply>)
    };
}

pub async fn health(environment: Environment) -> RouteResult {
    timed! {
        let (status, code) = match environment.lifecycle.ping().await {
            Ok(()) => ("healthy", StatusCode::OK),
            Err(e) => {
                error!(environment.logger, "Health check failed"; "error" => %e);
                ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
            }
        };

        let response = SuccessResponse::Health {
            status,
            timestamp: OffsetDateTime::now_utc().unix_timestamp(),
            uptime: environment.started.elapsed().as_secs_f64(),
            version: info::VERSION,
            revision: info::REVISION,
        };

        with_status(json(&response), code)
    }
}

pub async fn list(environment: Environment) -> RouteResult {
    timed! {
        let bhajans = environment
            .lifecycle
            .list()
            .await
            .map_err(|e| Rejection::new(Context::list(), e))?;

        debug!(environment.logger, "Listing bhajans..."; "count" => bhajans.len());
        json(&bhajans)
    }
}

pub async fn retrieve(environment: Environment, id: String) -> RouteResult {
    timed! {
        debug!(environment.logger, "Retrieving bhajan..."; "id" => &id);

        let bhajan = environment
            .lifecycle
            .find(&id)
            .await
            .map_err(|e| Rejection::new(Context::retrieve(id.clone()), e))?;

        json(&bhajan)
    }
}

pub async fn upload(environment: Environment, content: FormData) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::upload(), e);

        debug!(environment.logger, "Parsing submission...");
        let submission = parse_submission(content, environment.limits)
            .await
            .map_err(error_handler)?;

        let bhajan = environment
            .lifecycle
            .create(submission.changes, submission.payloads)
            .await
            .map_err(error_handler)?;

        let location = environment
            .urls
            .bhajan(bhajan.id())
            .map_err(|e| {
                error!(environment.logger, "Failed to generate bhajan URL"; "id" => %bhajan.id(), "error" => %e);
            })
            .ok();

        let reply = with_status(json(&bhajan), StatusCode::CREATED);

        match location {
            Some(location) => Box::new(with_header(reply, "location", location.as_str())) as Box<dyn Reply>,
            None => Box::new(reply),
        }
    }
}

pub async fn update(environment: Environment, id: String, content: FormData) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::update(id.clone()), e);

        debug!(environment.logger, "Parsing changes..."; "id" => &id);
        let submission = parse_submission(content, environment.limits)
            .await
            .map_err(error_handler)?;

        let bhajan = environment
            .lifecycle
            .update(&id, submission.changes, submission.payloads)
            .await
            .map_err(error_handler)?;

        json(&bhajan)
    }
}

pub async fn delete(environment: Environment, id: String) -> RouteResult {
    timed! {
        debug!(environment.logger, "Deleting bhajan..."; "id" => &id);

        let deleted = environment
            .lifecycle
            .delete(&id)
            .await
            .map_err(|e| Rejection::new(Context::delete(id.clone()), e))?;

        json(&SuccessResponse::Deleted {
            message: DELETED_MESSAGE,
            id: deleted.id().to_string(),
        })
    }
}

fn format_server_timing(seconds: Duration) -> String {
    format!("handler;dur={}", seconds.as_secs_f64() * 1000.0)
}
