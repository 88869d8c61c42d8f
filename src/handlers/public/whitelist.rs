use axum::{
    Json,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use strum::EnumString;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum WhitelistFormat {
    /// Full records as JSON (default)
    #[default]
    Json,
    /// One username per line, for plain-text consumers
    Usernames,
    /// A Lua array literal, consumed directly by the client script
    Lua,
}

#[derive(Debug, Deserialize)]
pub struct WhitelistQuery {
    #[serde(default)]
    pub format: Option<String>,
}

/// Derived read view over active, non-frozen keys' registered users.
pub async fn get_whitelist(
    State(state): State<AppState>,
    Query(query): Query<WhitelistQuery>,
) -> Result<Response> {
    let format = match query.format.as_deref() {
        None => WhitelistFormat::Json,
        Some(s) => s
            .parse()
            .map_err(|_| AppError::BadRequest(format!("Unknown whitelist format '{}'", s)))?,
    };

    let now = Utc::now().timestamp();
    let conn = state.db.get()?;
    let users = queries::list_whitelist_users(&conn, now)?;

    let response = match format {
        WhitelistFormat::Json => Json(users).into_response(),
        WhitelistFormat::Usernames => {
            let body = users
                .iter()
                .map(|u| u.username.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
        }
        WhitelistFormat::Lua => {
            let mut body = String::from("return {\n");
            for user in &users {
                body.push_str(&format!("    \"{}\",\n", user.username.replace('"', "\\\"")));
            }
            body.push('}');
            ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
        }
    };
    Ok(response)
}
