use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use crate::model::{Community, ContentItem, User};
use crate::store::Vote;

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub http_client: Option<HttpClient>,
}

/// Blocking client for the forum backend's read endpoints.
pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("api client user agent required");
        }
        let base_url = parse_base_url(&config.base_url).context("api: parse base url")?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(Duration::from_secs(20))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn communities(&self) -> Result<Vec<Community>> {
        self.get_json("groups").context("api: fetch groups")
    }

    pub fn users(&self) -> Result<Vec<User>> {
        self.get_json("users").context("api: fetch users")
    }

    pub fn posts(&self, group_id: u64) -> Result<Vec<ContentItem>> {
        self.get_json(&format!("groups/{group_id}/posts"))
            .with_context(|| format!("api: fetch posts for group {group_id}"))
    }

    /// `None` when the backend has no member for `address` in the group.
    pub fn member(&self, group_id: u64, address: &str) -> Result<Option<User>> {
        let address = utf8_percent_encode(address.trim(), NON_ALPHANUMERIC).to_string();
        let path = format!("groups/{group_id}/members/{address}");
        let resp = self.send(&path)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check_status(resp)?;
        let user: User = resp.json().context("api: decode member")?;
        Ok(Some(user))
    }

    pub fn vote(&self, item_id: &str, vote: Vote) -> Result<()> {
        let direction = match vote {
            Vote::Up => 1,
            Vote::Down => -1,
            Vote::None => 0,
        };
        let item = utf8_percent_encode(item_id, NON_ALPHANUMERIC).to_string();
        let url = self.base_url.join(&format!("items/{item}/vote"))?;
        let resp = self
            .http
            .post(url)
            .header(USER_AGENT, self.user_agent.clone())
            .json(&json!({ "direction": direction }))
            .send()
            .with_context(|| format!("api: vote on {item_id}"))?;
        check_status(resp)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = check_status(self.send(path)?)?;
        Ok(resp.json()?)
    }

    fn send(&self, path: &str) -> Result<Response> {
        let url = self.base_url.join(path)?;
        let resp = self
            .http
            .get(url)
            .header(USER_AGENT, self.user_agent.clone())
            .header(ACCEPT, "application/json")
            .send()?;
        Ok(resp)
    }
}

pub(crate) fn parse_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("base url is empty");
    }
    // Url::join drops the last path segment unless the base ends with a slash.
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Ok(Url::parse(&normalized)?)
}

pub(crate) fn check_status(resp: Response) -> Result<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().unwrap_or_default();
    match status.as_u16() {
        404 => Err(anyhow!("not found: {}", body.trim())),
        429 => Err(anyhow!("rate limited: {}", body.trim())),
        _ => Err(anyhow!("api error {}: {}", status, body.trim())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::thread;
    use tiny_http::{Header, Response as StubResponse, Server};

    fn serve(routes: Vec<(&'static str, u16, &'static str)>) -> String {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let expected = routes.len();
        thread::spawn(move || {
            for request in server.incoming_requests().take(expected) {
                let (status, body) = routes
                    .iter()
                    .find(|(path, _, _)| *path == request.url())
                    .map(|(_, status, body)| (*status, *body))
                    .unwrap_or((500, "unexpected"));
                let header = Header::from_bytes("Content-Type", "application/json").unwrap();
                let _ = request.respond(
                    StubResponse::from_string(body)
                        .with_status_code(status)
                        .with_header(header),
                );
            }
        });
        format!("http://{addr}/api")
    }

    fn client(base_url: String) -> Client {
        Client::new(ClientConfig {
            base_url,
            user_agent: "forum-state-test".into(),
            http_client: None,
        })
        .unwrap()
    }

    #[test]
    fn rejects_empty_user_agent() {
        let err = Client::new(ClientConfig {
            base_url: "http://localhost/api".into(),
            user_agent: " ".into(),
            http_client: None,
        });
        assert!(err.is_err());
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let url = parse_base_url("http://localhost/api").unwrap();
        assert_eq!(url.join("groups").unwrap().path(), "/api/groups");
    }

    #[test]
    fn fetches_groups_and_posts() {
        let base = serve(vec![
            ("/api/groups", 200, r#"[{"id": 1, "name": "Rust"}]"#),
            (
                "/api/groups/1/posts",
                200,
                r#"[{"id": "p1", "groupId": 1, "upvotes": 2}]"#,
            ),
        ]);
        let api = client(base);
        let groups = api.communities().unwrap();
        assert_eq!(groups[0].name, "Rust");
        let posts = api.posts(1).unwrap();
        assert_eq!(posts[0].upvotes, 2);
    }

    #[test]
    fn missing_member_is_none_and_errors_surface() {
        let base = serve(vec![
            ("/api/groups/3/members/0xabc", 404, "{}"),
            ("/api/users", 500, "boom"),
        ]);
        let api = client(base);
        assert_eq!(api.member(3, "0xabc").unwrap(), None);
        let err = api.users().unwrap_err();
        assert!(format!("{err:#}").contains("500"));
    }

    #[test]
    fn vote_posts_direction() {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        thread::spawn(move || {
            for mut request in server.incoming_requests().take(3) {
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let _ = tx.send((request.method().to_string(), request.url().to_string(), body));
                let _ = request.respond(StubResponse::empty(204u16));
            }
        });
        let api = client(format!("http://{addr}/api"));

        for (vote, direction) in [(Vote::Down, -1), (Vote::Up, 1), (Vote::None, 0)] {
            api.vote("p1", vote).unwrap();
            let (method, url, body) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(method, "POST");
            assert_eq!(url, "/api/items/p1/vote");
            let body: serde_json::Value = serde_json::from_str(&body).unwrap();
            assert_eq!(body, json!({ "direction": direction }));
        }
    }
}
