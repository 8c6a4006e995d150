//! The reply router: resolve a reply's destination from
//! `routes.json`, POST it if a route matches, else persist it to the
//! filesystem outbox. Generalizes a single hard-wired outbound sink into a
//! lookup over the workspace's own routing table, with the outbox as the
//! fallback sink.

use agentd_core::{OutboxMessage, Workspace};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("route delivery to {url} failed with status {status}")]
    NonSuccessStatus { url: String, status: u16 },

    #[error("route delivery to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to write outbox entry: {0}")]
    Outbox(#[from] std::io::Error),

    #[error(transparent)]
    Workspace(#[from] anyhow::Error),
}

/// Which sink a reply actually went out through — surfaced back to the
/// agent in the `reply` tool's confirmation string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Route(String),
    Outbox(String),
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Route(url) => write!(f, "route {url}"),
            Destination::Outbox(id) => write!(f, "outbox/{id}.json"),
        }
    }
}

#[derive(Clone)]
pub struct ReplyRouter {
    workspace: Workspace,
    http: reqwest::Client,
}

impl ReplyRouter {
    pub fn new(workspace: Workspace) -> Self {
        ReplyRouter {
            workspace,
            http: reqwest::Client::new(),
        }
    }

    /// Extract the routing prefix — the substring up to the first `:`, or
    /// the whole source if there is no colon.
    pub fn prefix_of(source: &str) -> &str {
        source.split_once(':').map(|(p, _)| p).unwrap_or(source)
    }

    /// Resolve `(source, content)` to a route or the outbox, deliver it, and
    /// report which destination was used.
    pub async fn deliver(&self, source: &str, content: &str) -> Result<Destination, RouterError> {
        let routes = self.workspace.read_routes().await?;
        let prefix = Self::prefix_of(source);

        if let Some(route) = routes.get(prefix) {
            let resp = self
                .http
                .post(&route.url)
                .json(&serde_json::json!({ "source": source, "content": content }))
                .send()
                .await
                .map_err(|source_err| RouterError::Transport {
                    url: route.url.clone(),
                    source: source_err,
                })?;

            if !resp.status().is_success() {
                return Err(RouterError::NonSuccessStatus {
                    url: route.url.clone(),
                    status: resp.status().as_u16(),
                });
            }
            return Ok(Destination::Route(route.url.clone()));
        }

        let message = OutboxMessage::new(source, content);
        self.workspace.write_outbox(&message).await?;
        Ok(Destination::Outbox(message.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentd_core::workspace::Route;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn workspace() -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.ensure_dirs().await.unwrap();
        (dir, ws)
    }

    #[test]
    fn prefix_of_splits_on_first_colon() {
        assert_eq!(ReplyRouter::prefix_of("telegram:123"), "telegram");
        assert_eq!(ReplyRouter::prefix_of("no-colon-here"), "no-colon-here");
        assert_eq!(ReplyRouter::prefix_of("a:b:c"), "a");
    }

    #[tokio::test]
    async fn no_matching_route_falls_back_to_outbox() {
        let (_dir, ws) = workspace().await;
        let router = ReplyRouter::new(ws.clone());
        let dest = router.deliver("other:s2", "Y").await.unwrap();
        assert!(matches!(dest, Destination::Outbox(_)));
        let outbox = ws.list_outbox().await.unwrap();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].source, "other:s2");
        assert_eq!(outbox[0].content, "Y");
    }

    #[tokio::test]
    async fn matching_route_posts_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json(serde_json::json!({"source": "bridge:s1", "content": "X"})))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (_dir, ws) = workspace().await;
        let mut routes = agentd_core::workspace::RoutesTable::new();
        routes.insert(
            "bridge".into(),
            Route {
                url: format!("{}/hook", server.uri()),
            },
        );
        tokio::fs::write(
            ws.routes_json_path(),
            serde_json::to_string(&routes).unwrap(),
        )
        .await
        .unwrap();

        let router = ReplyRouter::new(ws.clone());
        let dest = router.deliver("bridge:s1", "X").await.unwrap();
        assert!(matches!(dest, Destination::Route(_)));
        assert!(ws.list_outbox().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_2xx_response_is_a_delivery_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (_dir, ws) = workspace().await;
        let mut routes = agentd_core::workspace::RoutesTable::new();
        routes.insert(
            "bridge".into(),
            Route {
                url: format!("{}/hook", server.uri()),
            },
        );
        tokio::fs::write(
            ws.routes_json_path(),
            serde_json::to_string(&routes).unwrap(),
        )
        .await
        .unwrap();

        let router = ReplyRouter::new(ws);
        let err = router.deliver("bridge:s1", "X").await.unwrap_err();
        assert!(matches!(err, RouterError::NonSuccessStatus { .. }));
    }
}
