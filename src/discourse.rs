use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, USER_AGENT};
use url::Url;

use crate::api::{check_status, parse_base_url};
use crate::model::Topic;

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub http_client: Option<HttpClient>,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("discourse client user agent required");
        }
        let base_url =
            parse_base_url(&config.base_url).context("discourse: parse base url")?;
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

    pub fn topic(&self, topic_id: u64) -> Result<Topic> {
        let url = self.base_url.join(&format!("t/{topic_id}.json"))?;
        let resp = self
            .http
            .get(url)
            .header(USER_AGENT, self.user_agent.clone())
            .header(ACCEPT, "application/json")
            .send()
            .with_context(|| format!("discourse: request topic {topic_id}"))?;
        let resp = check_status(resp).with_context(|| format!("discourse: topic {topic_id}"))?;
        resp.json()
            .with_context(|| format!("discourse: decode topic {topic_id}"))
    }
}

/// Reads a topic saved from `/t/{id}.json`.
pub fn read_topic_file(path: &Path) -> Result<Topic> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read topic file at {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse topic file at {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::tempdir;
    use tiny_http::{Response, Server};

    #[test]
    fn fetches_topic_json() {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let body = if request.url() == "/t/12.json" {
                    r#"{"id": 12, "title": "Hi", "post_stream": {"posts": [
                        {"post_number": 1},
                        {"post_number": 2, "reply_to_post_number": 1}
                    ]}}"#
                } else {
                    "{}"
                };
                let _ = request.respond(Response::from_string(body));
            }
        });

        let client = Client::new(ClientConfig {
            base_url: format!("http://{addr}"),
            user_agent: "forum-state-test".into(),
            http_client: None,
        })
        .unwrap();
        let topic = client.topic(12).unwrap();
        assert_eq!(topic.title, "Hi");
        assert_eq!(topic.post_stream.posts[1].reply_to_post_number, Some(1));
    }

    #[test]
    fn reads_saved_topic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("topic.json");
        fs::write(&path, r#"{"id": 3, "post_stream": {"posts": []}}"#).unwrap();
        let topic = read_topic_file(&path).unwrap();
        assert_eq!(topic.id, 3);
        assert!(read_topic_file(&dir.path().join("nope.json")).is_err());
    }
}
