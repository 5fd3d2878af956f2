//! Shared GraphQL-over-HTTP transport for both commerce APIs.

use graphql_client::{QueryBody, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::queries::Operation;
use super::{CommerceError, GraphQLError, GraphQLErrorLocation};

/// The outcome of a call plus any session token the platform issued with it.
///
/// The platform may rotate the token on any response, including error
/// statuses, so the token is reported independently of the outcome.
pub struct Reply<T> {
    pub outcome: Result<T, CommerceError>,
    pub session_token: Option<String>,
}

/// Execute `operation` against `endpoint`.
///
/// `bearer` is sent as `Authorization: Bearer`; a token returned in the
/// `token_header` response header is handed back in [`Reply::session_token`].
pub async fn execute<V, T>(
    client: &reqwest::Client,
    endpoint: &str,
    token_header: &str,
    bearer: Option<&str>,
    operation: Operation,
    variables: V,
) -> Reply<T>
where
    V: Serialize + Send,
    T: DeserializeOwned,
{
    let body = QueryBody {
        variables,
        query: operation.document,
        operation_name: operation.name,
    };

    let mut request = client
        .post(endpoint)
        .header("Content-Type", "application/json")
        .json(&body);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            return Reply {
                outcome: Err(e.into()),
                session_token: None,
            };
        }
    };

    let session_token = response
        .headers()
        .get(token_header)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned);

    Reply {
        outcome: decode(response, operation).await,
        session_token,
    }
}

async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
    operation: Operation,
) -> Result<T, CommerceError> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(CommerceError::RateLimited(retry_after));
    }

    // Get response body as text first for better error diagnostics
    let response_text = response.text().await?;

    if !status.is_success() {
        tracing::error!(
            status = %status,
            operation = operation.name,
            body = %response_text.chars().take(500).collect::<String>(),
            "Commerce API returned non-success status"
        );
        return Err(CommerceError::Status {
            status: status.as_u16(),
            body: response_text.chars().take(200).collect(),
        });
    }

    let response: Response<T> = match serde_json::from_str(&response_text) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(
                error = %e,
                operation = operation.name,
                body = %response_text.chars().take(500).collect::<String>(),
                "Failed to parse commerce GraphQL response"
            );
            return Err(CommerceError::Parse(e));
        }
    };

    if let Some(errors) = response.errors
        && !errors.is_empty()
    {
        tracing::debug!(errors = ?errors, operation = operation.name, "GraphQL errors in response");
        return Err(CommerceError::GraphQL(
            errors.into_iter().map(convert_error).collect(),
        ));
    }

    response.data.ok_or_else(|| {
        tracing::error!(
            operation = operation.name,
            body = %response_text.chars().take(500).collect::<String>(),
            "Commerce GraphQL response has no data and no errors"
        );
        CommerceError::MissingData(operation.name)
    })
}

fn convert_error(e: graphql_client::Error) -> GraphQLError {
    let code = e
        .extensions
        .as_ref()
        .and_then(|ext| ext.get("code"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned);

    GraphQLError {
        message: e.message,
        code,
        locations: e.locations.map_or_else(Vec::new, |locs| {
            locs.into_iter()
                .map(|l| GraphQLErrorLocation {
                    line: i64::from(l.line),
                    column: i64::from(l.column),
                })
                .collect()
        }),
        path: e.path.map_or_else(Vec::new, |p| {
            p.into_iter()
                .map(|fragment| match fragment {
                    graphql_client::PathFragment::Key(s) => serde_json::Value::String(s),
                    graphql_client::PathFragment::Index(i) => serde_json::Value::Number(i.into()),
                })
                .collect()
        }),
    }
}
