use std::sync::Arc;

use log::{debug, error, Logger};
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Reply};

use crate::errors::BackendError;

mod handlers;
mod rejection;
mod response;

pub use internal::*;

pub async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<Box<dyn Reply>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        let e = &r.error;
        let status = status_code_for(e);

        if e.is_client_error() {
            debug!(logger, "Request rejected"; "context" => ?r.context, "kind" => e.kind(), "status" => %status, "message" => %e);
        } else {
            error!(logger, "Backend error"; "context" => ?r.context, "error" => ?e, "status" => %status, "message" => %e);
        }

        let flattened = r.flatten();

        return Ok(Box::new(with_status(json(&flattened), status)));
    }

    Err(rej)
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    match e {
        Validation(..)
        | InvalidId(..)
        | MalformedFormSubmission
        | MalformedField(..)
        | UnexpectedFile(..)
        | DuplicateFile(..)
        | TooManyFiles(..)
        | FileTooLarge { .. }
        | DisallowedContentType { .. } => StatusCode::BAD_REQUEST,
        NonExistentId(..) => StatusCode::NOT_FOUND,
        Ingestion(..) | Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

mod internal {
    use warp::filters::multipart::form;
    use warp::filters::BoxedFilter;
    use warp::path::end;
    use warp::Filter;
    use warp::Reply;
    use warp::{delete, get as g, patch, path as p, path::param as par, post};

    use super::{format_rejection, handlers};
    use crate::environment::Environment;

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    macro_rules! route_filter {
    ($route_variable:ident; $first:expr) => (let $route_variable = $route_variable.and($first););
    ($route_variable:ident; $first:expr, $($rest:expr),+) => (
        let $route_variable = $route_variable.and($first);
        route_filter!($route_variable; $($rest),+);
    )
}

    macro_rules! route {
    ($name:ident => $handler:ident, $route_variable:ident; $($filters:expr),+) => (
        route!($name => $handler, environment, $route_variable; $($filters),+);
    );
    ($name:ident => $handler:ident, $environment:ident, $route_variable:ident; $($filters:expr),+) => (
        pub fn $name($environment: Environment) -> Route {
            let prefix = prefix_filter(&$environment.urls.bhajans_path);
            let state = $environment.clone();

            let $route_variable = warp::any()
                .map(move || state.clone())
                .and(prefix);

            route_filter!($route_variable; $($filters),+);

            $route_variable.and_then(handlers::$handler)
                .boxed()
        }
    );
}

    route!(make_health_route => health, rt; p("health"), end(), g());
    route!(make_list_route => list, rt; end(), g());
    route!(make_retrieve_route => retrieve, rt; par::<String>(), end(), g());
    route!(make_upload_route => upload, environment, rt; p("upload"), end(), post(), form().max_length(environment.limits.max_content_length()));
    route!(make_update_route => update, environment, rt; par::<String>(), end(), patch(), form().max_length(environment.limits.max_content_length()));
    route!(make_delete_route => delete, rt; par::<String>(), end(), delete());

    /// Every route, with backend errors rendered as JSON.
    pub fn make_routes(environment: Environment) -> Route {
        let logger = environment.logger.clone();

        make_health_route(environment.clone())
            .or(make_list_route(environment.clone()))
            .unify()
            .or(make_upload_route(environment.clone()))
            .unify()
            .or(make_retrieve_route(environment.clone()))
            .unify()
            .or(make_update_route(environment.clone()))
            .unify()
            .or(make_delete_route(environment))
            .unify()
            .recover(move |r| format_rejection(logger.clone(), r))
            .unify()
            .boxed()
    }

    /// Matches the path segments every bhajan route sits under.
    fn prefix_filter(segments: &[String]) -> BoxedFilter<()> {
        segments
            .iter()
            .fold(warp::any().boxed(), |filter, segment| {
                filter.and(p(segment.clone())).boxed()
            })
    }
}
