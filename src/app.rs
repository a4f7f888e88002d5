use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;

use crate::api;
use crate::breadcrumbs;
use crate::config::{self, Config};
use crate::data::{self, ThreadService};
use crate::discourse;
use crate::logging;
use crate::model::ContentItem;
use crate::render;
use crate::replies;
use crate::sort::{self, SortMode};
use crate::store::Store;
use crate::sync::{self, Services, SyncEvent, Syncer};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Thread {
        source: String,
        width: Option<usize>,
    },
    Sort {
        path: PathBuf,
        mode: Option<SortMode>,
    },
    Crumbs {
        pathname: String,
    },
    Communities,
    Config,
}

pub fn parse_command(args: &[String]) -> Result<Command> {
    let mut iter = args.iter();
    let name = iter.next().ok_or_else(|| anyhow!("missing command, see --help"))?;
    let mut positional: Vec<&String> = Vec::new();
    let mut width = None;
    let mut mode = None;
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--width" => {
                let value = iter.next().context("--width needs a value")?;
                width = Some(
                    value
                        .parse::<usize>()
                        .with_context(|| format!("invalid width {value:?}"))?,
                );
            }
            "--mode" => {
                let value = iter.next().context("--mode needs a value")?;
                mode = Some(SortMode::from_key(value));
            }
            _ => positional.push(arg),
        }
    }

    let first = |what: &str| -> Result<String> {
        positional
            .first()
            .map(|value| value.to_string())
            .ok_or_else(|| anyhow!("{name} needs {what}"))
    };

    match name.as_str() {
        "thread" => Ok(Command::Thread {
            source: first("a topic file or id")?,
            width,
        }),
        "sort" => Ok(Command::Sort {
            path: PathBuf::from(first("an items file")?),
            mode,
        }),
        "crumbs" => Ok(Command::Crumbs {
            pathname: first("a pathname")?,
        }),
        "communities" => Ok(Command::Communities),
        "config" => Ok(Command::Config),
        other => bail!("unknown command {other:?}, see --help"),
    }
}

pub fn run(args: &[String]) -> Result<()> {
    let command = parse_command(args)?;
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    logging::init(&cfg.log.level);

    match command {
        Command::Thread { source, width } => {
            let width = width.unwrap_or(cfg.ui.width);
            for line in thread_lines(&cfg, &source, width)? {
                println!("{line}");
            }
        }
        Command::Sort { path, mode } => {
            let items = read_items(&path)?;
            let mode = mode.unwrap_or(cfg.ui.default_sort);
            let sorted = sort::merge_and_sort(Vec::new(), items, mode);
            for line in render::render_items(&sorted) {
                println!("{line}");
            }
        }
        Command::Crumbs { pathname } => {
            let crumbs = breadcrumbs::breadcrumbs_for(None, None, &pathname);
            println!("{}", render::render_breadcrumbs(&crumbs));
        }
        Command::Communities => {
            let mut syncer = build_syncer(&cfg)?;
            syncer.refresh_communities();
            expect_applied(syncer.wait(FETCH_TIMEOUT))?;
            let state = syncer.store().get_state();
            info!(count = state.communities.len(), "listing communities");
            for community in &state.communities {
                let gates: Vec<String> = community
                    .requirements
                    .iter()
                    .map(|req| format!("{} {}", req.display_amount(), req.token))
                    .collect();
                println!(
                    "{}\t{}\t{}",
                    community.id,
                    breadcrumbs::truncate_label(
                        Some(&community.name),
                        breadcrumbs::COMMUNITY_LABEL_MAX
                    ),
                    gates.join(", ")
                );
            }
        }
        Command::Config => {
            print!("{}", config::to_yaml(&cfg)?);
        }
    }
    Ok(())
}

fn thread_lines(cfg: &Config, source: &str, width: usize) -> Result<Vec<String>> {
    let path = Path::new(source);
    if path.exists() {
        let topic = discourse::read_topic_file(path)?;
        let forest = replies::build_reply_tree(topic.post_stream.posts);
        return Ok(render::render_thread(&forest, width));
    }

    let topic_id: u64 = source
        .parse()
        .with_context(|| format!("{source:?} is neither a file nor a topic id"))?;
    let mut syncer = build_syncer(cfg)?;
    if syncer.load_thread(topic_id).is_none() {
        bail!("discourse.base_url is not configured");
    }
    match syncer.wait(FETCH_TIMEOUT) {
        Some(SyncEvent::Thread { forest, .. }) => Ok(render::render_thread(&forest, width)),
        other => expect_applied(other).map(|_| Vec::new()),
    }
}

fn expect_applied(event: Option<SyncEvent>) -> Result<()> {
    match event {
        Some(SyncEvent::Applied(_)) | Some(SyncEvent::Thread { .. }) => Ok(()),
        Some(SyncEvent::Failed { error, .. }) => Err(anyhow!(error)),
        Some(other) => Err(anyhow!("unexpected sync event {other:?}")),
        None => Err(anyhow!("timed out waiting for the server")),
    }
}

fn read_items(path: &Path) -> Result<Vec<ContentItem>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read items file at {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse items file at {}", path.display()))
}

pub fn build_syncer(cfg: &Config) -> Result<Syncer> {
    let client = Arc::new(
        api::Client::new(api::ClientConfig {
            base_url: cfg.api.base_url.clone(),
            user_agent: cfg.api.user_agent.clone(),
            http_client: None,
        })
        .context("build api client")?,
    );

    let threads: Option<Arc<dyn ThreadService>> = if cfg.discourse.base_url.trim().is_empty() {
        None
    } else {
        let client = discourse::Client::new(discourse::ClientConfig {
            base_url: cfg.discourse.base_url.clone(),
            user_agent: cfg.api.user_agent.clone(),
            http_client: None,
        })
        .context("build discourse client")?;
        let service: Arc<dyn ThreadService> =
            Arc::new(data::DiscourseThreadService::new(Arc::new(client)));
        Some(service)
    };

    let services = Services {
        communities: Arc::new(data::ApiCommunityService::new(client.clone())),
        users: Arc::new(data::ApiUserService::new(client.clone())),
        content: Arc::new(data::ApiContentService::new(client.clone())),
        membership: Arc::new(data::ApiMembershipService::new(client.clone())),
        votes: Arc::new(data::ApiVoteService::new(client)),
        threads,
    };

    Ok(Syncer::new(
        Arc::new(Store::default()),
        services,
        sync::Options {
            refresh_interval: cfg.sync.refresh_interval,
        },
    ))
}
