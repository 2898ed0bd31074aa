use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, de::DeserializeOwned};

use crate::relay::{Outcome, Relay, StatusReport};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const DEFAULT_CLIENT_ID: &str = "default";
const DEFAULT_USERNAME: &str = "unknown";
const DEFAULT_RIG_NAME: &str = "RelayMiner";

const INDEX: &str = "\
pool relay

POST /connect     {client_id}                                   open a pool session
POST /job         {client_id, username, key?, difficulty?}      request a job
POST /submit      {client_id, result, hashrate?, rig_name?, key?} submit a result
POST /disconnect  {client_id}                                   close the session
GET  /status                                                    live session count
";

type AppState = Arc<Relay>;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .route("/connect", post(connect))
        .route("/job", post(job))
        .route("/submit", post(submit))
        .route("/disconnect", post(disconnect))
}

// -----------------------------------------------------------------------------
// ----- Request bodies --------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConnectBody {
    client_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JobBody {
    client_id: Option<String>,
    username: Option<String>,
    #[serde(alias = "mining_key")]
    key: Option<String>,
    #[serde(alias = "difficulty_tag")]
    difficulty: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SubmitBody {
    client_id: Option<String>,
    result: Option<Scalar>,
    hashrate: Option<Scalar>,
    rig_name: Option<String>,
    #[serde(alias = "mining_key")]
    key: Option<String>,
}

/// Miners send numbers as either JSON numbers or strings; both are forwarded
/// verbatim.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Number(n) => n.to_string(),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Handlers --------------------------------------------------------------

async fn index() -> &'static str {
    INDEX
}

async fn status(State(relay): State<AppState>) -> Json<StatusReport> {
    Json(relay.status())
}

async fn connect(State(relay): State<AppState>, body: Bytes) -> Response {
    let body: ConnectBody = match parse_body(&body) {
        Ok(body) => body,
        Err(rejection) => return rejection,
    };

    let client_id = client_id(body.client_id);
    Json(relay.connect(&client_id).await).into_response()
}

async fn job(State(relay): State<AppState>, body: Bytes) -> Response {
    let body: JobBody = match parse_body(&body) {
        Ok(body) => body,
        Err(rejection) => return rejection,
    };

    let client_id = client_id(body.client_id);
    let username = body.username.unwrap_or_else(|| DEFAULT_USERNAME.to_string());

    let outcome = relay
        .request_job(
            &client_id,
            &username,
            body.key.as_deref(),
            body.difficulty.as_deref(),
        )
        .await;
    Json(outcome).into_response()
}

async fn submit(State(relay): State<AppState>, body: Bytes) -> Response {
    let body: SubmitBody = match parse_body(&body) {
        Ok(body) => body,
        Err(rejection) => return rejection,
    };

    let Some(result) = body.result.map(Scalar::into_string) else {
        return Json(Outcome::<()>::invalid("missing field 'result'")).into_response();
    };

    let client_id = client_id(body.client_id);
    let hashrate = body.hashrate.map(Scalar::into_string).unwrap_or_default();
    let rig_name = body.rig_name.unwrap_or_else(|| DEFAULT_RIG_NAME.to_string());

    let outcome = relay
        .submit_result(&client_id, &result, &hashrate, &rig_name, body.key.as_deref())
        .await;
    Json(outcome).into_response()
}

async fn disconnect(State(relay): State<AppState>, body: Bytes) -> Response {
    let body: ConnectBody = match parse_body(&body) {
        Ok(body) => body,
        Err(rejection) => return rejection,
    };

    let client_id = client_id(body.client_id);
    Json(relay.disconnect(&client_id).await).into_response()
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

/// An empty body means "all defaults"; malformed JSON becomes an outcome
/// rather than a framework rejection.
fn parse_body<T>(body: &Bytes) -> Result<T, Response>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    serde_json::from_slice(body).map_err(|e| {
        Json(Outcome::<()>::invalid(format!("invalid JSON body: {e}"))).into_response()
    })
}

fn client_id(value: Option<String>) -> String {
    value
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string())
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
