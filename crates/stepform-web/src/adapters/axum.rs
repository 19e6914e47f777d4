use crate::pages::{LOGIN_PATH, RESUME_PARAM, login_page, read_login};
use crate::site::{Outcome, Site};
use axum::Router;
use axum::extract::{FromRequest, Multipart, Path as AxumPath, Query, Request as HttpRequest, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use std::collections::HashMap;
use std::sync::Arc;
use stepform_core::{Identity, Request, STEP_MOUNT, Token, Transition};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Header that carries the caller's identity, for trusted front proxies.
pub const USER_HEADER: &str = "x-stepform-user";
/// Cookie set by the login form.
pub const USER_COOKIE: &str = "stepform_user";

type Pairs = Vec<(String, String)>;

#[derive(Clone)]
pub struct AxumStepformAdapter {
    site: Arc<Site>,
    default_user: Option<String>,
}

impl AxumStepformAdapter {
    pub fn new(site: Arc<Site>) -> Self {
        Self {
            site,
            default_user: None,
        }
    }

    /// Identity used when a request carries none.
    pub fn with_default_user(mut self, user: impl Into<String>) -> Self {
        self.default_user = Some(user.into());
        self
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn router(&self) -> Router {
        let step_route = format!("{STEP_MOUNT}/:token");
        Router::new()
            .route("/", get(route_index))
            .route("/calendar", get(route_calendar))
            .route("/elections/new", get(route_new_election))
            .route(LOGIN_PATH, post(route_login))
            .route(&step_route, get(route_step_get).post(route_step_post))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    /// Dispatches one step request built from decoded parameters.
    pub fn dispatch(
        &self,
        token: &str,
        default: Transition,
        pairs: Pairs,
        headers: &HeaderMap,
    ) -> Response {
        let Some(req) = Request::from_pairs(Token::new(token), default, pairs) else {
            return outcome_response(self.site.bad_request("unrecognized transition or form version"));
        };
        let req = req.with_identity(self.identity(headers));
        outcome_response(self.site.handle(req))
    }

    fn identity(&self, headers: &HeaderMap) -> Option<Identity> {
        let from_header = headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        from_header
            .or_else(|| parse_cookies(headers).remove(USER_COOKIE))
            .filter(|v| !v.is_empty())
            .or_else(|| self.default_user.clone())
            .map(Identity::new)
    }
}

fn outcome_response(outcome: Outcome) -> Response {
    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Html(outcome.page.render())).into_response()
}

fn step_location(token: &Token) -> String {
    format!("{STEP_MOUNT}/{token}")
}

async fn route_index(State(adapter): State<AxumStepformAdapter>) -> Response {
    Html(adapter.site.index().render()).into_response()
}

async fn route_calendar(State(adapter): State<AxumStepformAdapter>) -> Response {
    let token = adapter.site.start_calendar();
    debug!(token = %token, "calendar session started");
    Redirect::to(&step_location(&token)).into_response()
}

async fn route_new_election(State(adapter): State<AxumStepformAdapter>) -> Response {
    match adapter.site.start_election() {
        Ok(token) => Redirect::to(&step_location(&token)).into_response(),
        Err(err) => outcome_response(adapter.site.failure(&err.to_string())),
    }
}

async fn route_step_get(
    State(adapter): State<AxumStepformAdapter>,
    AxumPath(token): AxumPath<String>,
    headers: HeaderMap,
    Query(pairs): Query<Pairs>,
) -> Response {
    adapter.dispatch(&token, Transition::Enter, pairs, &headers)
}

async fn route_step_post(
    State(adapter): State<AxumStepformAdapter>,
    AxumPath(token): AxumPath<String>,
    headers: HeaderMap,
    request: HttpRequest,
) -> Response {
    match read_form(&headers, request).await {
        Ok(pairs) => adapter.dispatch(&token, Transition::Submit, pairs, &headers),
        Err(reason) => outcome_response(adapter.site.bad_request(&reason)),
    }
}

async fn route_login(
    State(adapter): State<AxumStepformAdapter>,
    headers: HeaderMap,
    request: HttpRequest,
) -> Response {
    let pairs = match read_form(&headers, request).await {
        Ok(pairs) => pairs,
        Err(reason) => return outcome_response(adapter.site.bad_request(&reason)),
    };
    let Some(req) = Request::from_pairs(Token::new("login"), Transition::Submit, pairs) else {
        return outcome_response(adapter.site.bad_request("malformed login form"));
    };
    let resume = req.raw(RESUME_PARAM).unwrap_or_default().to_string();
    if resume.is_empty() || !resume.chars().all(|c| c.is_ascii_alphanumeric()) {
        return outcome_response(adapter.site.bad_request("missing or invalid resume token"));
    }
    let resume = Token::new(resume);

    let Some(user) = read_login(&req) else {
        return match login_page(adapter.site.config(), &resume) {
            Ok(page) => (StatusCode::BAD_REQUEST, Html(page.render())).into_response(),
            Err(err) => outcome_response(adapter.site.bad_request(&err.to_string())),
        };
    };
    info!(user = %user, "user logged in");
    let mut response = Redirect::to(&step_location(&resume)).into_response();
    let cookie = format!("{USER_COOKIE}={user}; Path=/; HttpOnly; SameSite=Lax");
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

/// Decodes an urlencoded or multipart body into name/value pairs. Uploaded
/// files become the text of their content.
async fn read_form(headers: &HeaderMap, request: HttpRequest) -> Result<Pairs, String> {
    let multipart = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    if !multipart {
        let axum::Form(pairs) = axum::Form::<Pairs>::from_request(request, &())
            .await
            .map_err(|e| format!("invalid form body: {e}"))?;
        return Ok(pairs);
    }

    let mut body = Multipart::from_request(request, &())
        .await
        .map_err(|e| format!("invalid multipart body: {e}"))?;
    let mut pairs = Vec::new();
    while let Some(field) = body
        .next_field()
        .await
        .map_err(|e| format!("invalid multipart body: {e}"))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| format!("invalid multipart field `{name}`: {e}"))?;
        pairs.push((name, String::from_utf8_lossy(&bytes).into_owned()));
    }
    Ok(pairs)
}

fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for raw in headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
    {
        for part in raw.split(';') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let (name, value) = trimmed
                .split_once('=')
                .map(|(n, v)| (n.trim(), v.trim()))
                .unwrap_or((trimmed, ""));
            if !name.is_empty() {
                out.insert(name.to_string(), value.to_string());
            }
        }
    }
    out
}
