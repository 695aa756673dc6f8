//! Shared plumbing for HTTP backends.

use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::RagError;

/// Which capability a backend call serves; selects the "unavailable" variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Embedding,
    Generation,
}

impl Role {
    pub(crate) fn unavailable(self, backend: &str, message: String) -> RagError {
        match self {
            Self::Embedding => {
                RagError::EmbeddingUnavailable { provider: backend.to_string(), message }
            }
            Self::Generation => {
                RagError::GenerationUnavailable { backend: backend.to_string(), message }
            }
        }
    }
}

/// Error bodies of the form `{"error": "..."}` (Ollama) or
/// `{"error": {"message": "..."}}` (OpenAI).
#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Plain { error: String },
    Nested { error: ErrorDetail },
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Map a transport failure (connection refused, DNS, TLS...) to "unavailable".
pub(crate) fn transport_error(role: Role, backend: &str, err: reqwest::Error) -> RagError {
    role.unavailable(backend, format!("request failed: {err}"))
}

/// Map a non-success HTTP status and its body to "unavailable".
pub(crate) fn status_error(role: Role, backend: &str, status: StatusCode, body: &str) -> RagError {
    let detail = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody::Plain { error }) => error,
        Ok(ErrorBody::Nested { error }) => error.message,
        Err(_) => body.trim().to_string(),
    };
    role.unavailable(backend, format!("API returned {status}: {detail}"))
}

/// Parse a success body, mapping failures to [`RagError::MalformedResponse`].
pub(crate) fn parse_body<T: DeserializeOwned>(backend: &str, body: &str) -> Result<T, RagError> {
    serde_json::from_str(body).map_err(|e| RagError::MalformedResponse {
        backend: backend.to_string(),
        message: format!("failed to parse response: {e}"),
    })
}

/// Send a JSON POST and return the body of a successful response.
pub(crate) async fn post_json<B: serde::Serialize + ?Sized>(
    role: Role,
    backend: &str,
    request: reqwest::RequestBuilder,
    body: &B,
) -> Result<String, RagError> {
    let response = request.json(body).send().await.map_err(|e| transport_error(role, backend, e))?;
    let status = response.status();
    let text = response.text().await.map_err(|e| transport_error(role, backend, e))?;
    if !status.is_success() {
        return Err(status_error(role, backend, status, &text));
    }
    Ok(text)
}

/// Check a batch of embeddings against the request size and dimension.
pub(crate) fn check_embeddings(
    backend: &str,
    embeddings: &[Vec<f32>],
    expected_count: usize,
    dimension: usize,
) -> Result<(), RagError> {
    if embeddings.len() != expected_count {
        return Err(RagError::MalformedResponse {
            backend: backend.to_string(),
            message: format!("expected {expected_count} embeddings, got {}", embeddings.len()),
        });
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
        return Err(RagError::MalformedResponse {
            backend: backend.to_string(),
            message: format!("expected {dimension}-dimensional embeddings, got {}", bad.len()),
        });
    }
    if let Some(position) = embeddings.iter().position(|e| e.iter().any(|x| !x.is_finite())) {
        return Err(RagError::MalformedResponse {
            backend: backend.to_string(),
            message: format!("embedding {position} has non-finite components"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_extract_message() {
        let err = status_error(
            Role::Embedding,
            "Ollama",
            StatusCode::NOT_FOUND,
            r#"{"error":"model \"nomic\" not found, try pulling it first"}"#,
        );
        match err {
            RagError::EmbeddingUnavailable { provider, message } => {
                assert_eq!(provider, "Ollama");
                assert!(message.contains("404"));
                assert!(message.contains("try pulling it first"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let err = status_error(
            Role::Generation,
            "OpenAI",
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"Incorrect API key"}}"#,
        );
        assert!(
            matches!(err, RagError::GenerationUnavailable { ref message, .. } if message.contains("Incorrect API key"))
        );
    }

    #[test]
    fn unparseable_success_body_is_malformed() {
        let err = parse_body::<serde_json::Value>("Ollama", "<html>").unwrap_err();
        assert!(matches!(err, RagError::MalformedResponse { .. }));
    }

    #[test]
    fn embedding_shape_is_checked() {
        let ok = vec![vec![0.0; 3], vec![1.0; 3]];
        assert!(check_embeddings("x", &ok, 2, 3).is_ok());
        assert!(check_embeddings("x", &ok, 3, 3).is_err());
        assert!(check_embeddings("x", &ok, 2, 4).is_err());
    }

    #[test]
    fn non_finite_embeddings_are_malformed() {
        let nan = vec![vec![0.5, 0.5], vec![f32::NAN, 0.0]];
        let err = check_embeddings("x", &nan, 2, 2).unwrap_err();
        assert!(matches!(err, RagError::MalformedResponse { ref message, .. } if message.contains("embedding 1")));

        let inf = vec![vec![f32::NEG_INFINITY, 0.0]];
        assert!(check_embeddings("x", &inf, 1, 2).is_err());
    }
}
