//! Feeds network results into the [`Store`].
//!
//! Fetches run on background threads and report back over a channel. A result
//! is applied only while its request is still the latest for its slot and its
//! [`CancelToken`] has not fired; anything else is dropped. The store itself
//! never sees a stale response.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::data::{
    CommunityService, ContentService, MembershipService, ThreadService, UserService, VoteService,
};
use crate::model::{Community, ContentItem, Topic, User};
use crate::replies::{build_reply_tree, ReplyNode};
use crate::store::{toggle_vote, Action, Joined, Store, Vote};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("community {0} is not cached")]
    UnknownCommunity(u64),
    #[error("wallet address required")]
    MissingAddress,
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Communities,
    Users,
    ActiveCommunity,
    Membership(u64),
    Thread(u64),
}

#[derive(Debug)]
pub enum SyncEvent {
    Applied(Slot),
    Dropped(Slot),
    Failed { slot: Slot, error: String },
    Thread { topic_id: u64, forest: Vec<ReplyNode> },
    VoteAccepted { item_id: String },
    VoteRejected { item_id: String, error: String },
}

#[derive(Clone)]
pub struct Services {
    pub communities: Arc<dyn CommunityService>,
    pub users: Arc<dyn UserService>,
    pub content: Arc<dyn ContentService>,
    pub membership: Arc<dyn MembershipService>,
    pub votes: Arc<dyn VoteService>,
    pub threads: Option<Arc<dyn ThreadService>>,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub refresh_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
        }
    }
}

struct Pending {
    request_id: u64,
    cancel: CancelToken,
}

/// Vote bookkeeping for one item. `shown` is the vote reflected in the cached
/// counts; `pending` lists requests the server has not answered, oldest first.
#[derive(Debug, Default)]
struct VoteTrack {
    confirmed: Vote,
    confirmed_request: u64,
    shown: Vote,
    pending: Vec<(u64, Vote)>,
}

impl VoteTrack {
    fn settled(&self) -> Vote {
        self.pending
            .last()
            .map(|(_, vote)| *vote)
            .unwrap_or(self.confirmed)
    }
}

enum SyncResponse {
    Communities {
        request_id: u64,
        result: Result<Vec<Community>>,
    },
    Users {
        request_id: u64,
        result: Result<Vec<User>>,
    },
    ActiveCommunity {
        request_id: u64,
        community: Community,
        result: Result<Vec<ContentItem>>,
    },
    Membership {
        request_id: u64,
        community_id: u64,
        result: Result<Option<User>>,
    },
    Thread {
        request_id: u64,
        topic_id: u64,
        result: Result<Topic>,
    },
    Vote {
        request_id: u64,
        item_id: String,
        vote: Vote,
        error: Option<String>,
    },
}

impl SyncResponse {
    fn request(&self) -> Option<(Slot, u64)> {
        match self {
            SyncResponse::Communities { request_id, .. } => Some((Slot::Communities, *request_id)),
            SyncResponse::Users { request_id, .. } => Some((Slot::Users, *request_id)),
            SyncResponse::ActiveCommunity { request_id, .. } => {
                Some((Slot::ActiveCommunity, *request_id))
            }
            SyncResponse::Membership {
                request_id,
                community_id,
                ..
            } => Some((Slot::Membership(*community_id), *request_id)),
            SyncResponse::Thread {
                request_id,
                topic_id,
                ..
            } => Some((Slot::Thread(*topic_id), *request_id)),
            SyncResponse::Vote { .. } => None,
        }
    }
}

pub struct Syncer {
    store: Arc<Store>,
    services: Services,
    options: Options,
    response_tx: Sender<SyncResponse>,
    response_rx: Receiver<SyncResponse>,
    next_request_id: u64,
    pending: HashMap<Slot, Pending>,
    votes: HashMap<String, VoteTrack>,
    last_refresh: Option<Instant>,
}

impl Syncer {
    pub fn new(store: Arc<Store>, services: Services, options: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        Self {
            store,
            services,
            options,
            response_tx,
            response_rx,
            next_request_id: 1,
            pending: HashMap::new(),
            votes: HashMap::new(),
            last_refresh: None,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn is_pending(&self, slot: Slot) -> bool {
        self.pending.contains_key(&slot)
    }

    fn next_id(&mut self) -> u64 {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        request_id
    }

    fn begin(&mut self, slot: Slot) -> (u64, CancelToken) {
        let request_id = self.next_id();
        let cancel = CancelToken::default();
        // A newer request supersedes whatever was in flight for the slot.
        if let Some(previous) = self.pending.insert(
            slot,
            Pending {
                request_id,
                cancel: cancel.clone(),
            },
        ) {
            previous.cancel.cancel();
        }
        (request_id, cancel)
    }

    pub fn refresh_communities(&mut self) -> u64 {
        let (request_id, cancel) = self.begin(Slot::Communities);
        let tx = self.response_tx.clone();
        let service = self.services.communities.clone();
        thread::spawn(move || {
            if cancel.is_cancelled() {
                return;
            }
            let result = service.list_communities();
            let _ = tx.send(SyncResponse::Communities { request_id, result });
        });
        request_id
    }

    pub fn refresh_users(&mut self) -> u64 {
        let (request_id, cancel) = self.begin(Slot::Users);
        let tx = self.response_tx.clone();
        let service = self.services.users.clone();
        thread::spawn(move || {
            if cancel.is_cancelled() {
                return;
            }
            let result = service.list_users();
            let _ = tx.send(SyncResponse::Users { request_id, result });
        });
        request_id
    }

    pub fn refresh_all(&mut self) {
        self.refresh_communities();
        self.refresh_users();
        if let Some(community_id) = self.active_community_id() {
            if let Err(err) = self.open_community(community_id) {
                debug!(community_id, error = %err, "active community vanished before refresh");
            }
        }
        self.last_refresh = Some(Instant::now());
    }

    /// Starts a refresh when the configured interval has elapsed.
    pub fn refresh_if_due(&mut self) -> bool {
        let due = self
            .last_refresh
            .map(|at| at.elapsed() >= self.options.refresh_interval)
            .unwrap_or(true);
        if due {
            self.refresh_all();
        }
        due
    }

    fn active_community_id(&self) -> Option<u64> {
        self.store.read(|state| {
            state
                .active_community
                .as_ref()
                .map(|active| active.community.id)
        })
    }

    /// Makes `community_id` the active community and loads its posts. Cached
    /// posts stay visible while the reload is in flight.
    pub fn open_community(&mut self, community_id: u64) -> Result<u64> {
        let (community, cached_posts) = self.store.read(|state| {
            let community = state.community(community_id).cloned();
            let posts = state
                .active_community
                .as_ref()
                .filter(|active| active.community.id == community_id)
                .and_then(|active| active.posts.clone());
            (community, posts)
        });
        let community = community.ok_or(SyncError::UnknownCommunity(community_id))?;

        self.store.dispatch(Action::SetActiveCommunity {
            community: community.clone(),
            posts: cached_posts,
        });

        let (request_id, cancel) = self.begin(Slot::ActiveCommunity);
        let tx = self.response_tx.clone();
        let service = self.services.content.clone();
        thread::spawn(move || {
            if cancel.is_cancelled() {
                return;
            }
            let result = service.list_posts(community.id);
            let _ = tx.send(SyncResponse::ActiveCommunity {
                request_id,
                community,
                result,
            });
        });
        Ok(request_id)
    }

    /// Navigation away from a community: abandon its load and clear the slot.
    pub fn cancel_active(&mut self) {
        if let Some(pending) = self.pending.remove(&Slot::ActiveCommunity) {
            pending.cancel.cancel();
        }
        self.store.dispatch(Action::ClearActiveCommunity);
    }

    /// Resolves membership at most once per community. Returns whether a
    /// request was issued.
    pub fn ensure_membership(&mut self, address: &str, community_id: u64) -> Result<bool> {
        let address = address.trim();
        if address.is_empty() {
            return Err(SyncError::MissingAddress.into());
        }
        let known = self
            .store
            .read(|state| state.joined(community_id).is_some());
        let slot = Slot::Membership(community_id);
        if known || self.pending.contains_key(&slot) {
            return Ok(false);
        }

        let (request_id, cancel) = self.begin(slot);
        let tx = self.response_tx.clone();
        let service = self.services.membership.clone();
        let address = address.to_string();
        thread::spawn(move || {
            if cancel.is_cancelled() {
                return;
            }
            let result = service.resolve_member(&address, community_id);
            let _ = tx.send(SyncResponse::Membership {
                request_id,
                community_id,
                result,
            });
        });
        Ok(true)
    }

    /// Forgets a cached membership so the next `ensure_membership` refetches.
    pub fn invalidate_membership(&mut self, community_id: u64) {
        if let Some(pending) = self.pending.remove(&Slot::Membership(community_id)) {
            pending.cancel.cancel();
        }
        self.store.dispatch(Action::InvalidateJoined(community_id));
    }

    /// Applies the vote locally right away. Once the server has answered
    /// every outstanding vote on the item, the counts reflect the newest
    /// accepted vote and rejected ones are undone.
    pub fn vote(&mut self, item_id: &str, requested: Vote) -> Vote {
        let request_id = self.next_id();
        let track = self.votes.entry(item_id.to_string()).or_default();
        let previous = track.shown;
        let next = toggle_vote(previous, requested);
        track.pending.push((request_id, next));
        track.shown = next;
        self.store.dispatch(Action::ApplyVote {
            item_id: item_id.to_string(),
            vote: next,
            previous,
        });

        let tx = self.response_tx.clone();
        let service = self.services.votes.clone();
        let item_id = item_id.to_string();
        thread::spawn(move || {
            let error = service.vote(&item_id, next).err().map(|err| format!("{err:#}"));
            let _ = tx.send(SyncResponse::Vote {
                request_id,
                item_id,
                vote: next,
                error,
            });
        });
        next
    }

    pub fn current_vote(&self, item_id: &str) -> Vote {
        self.votes
            .get(item_id)
            .map(|track| track.shown)
            .unwrap_or_default()
    }

    fn settle_vote(
        &mut self,
        request_id: u64,
        item_id: String,
        vote: Vote,
        error: Option<String>,
    ) -> SyncEvent {
        let Some(track) = self.votes.get_mut(&item_id) else {
            return match error {
                None => SyncEvent::VoteAccepted { item_id },
                Some(error) => SyncEvent::VoteRejected { item_id, error },
            };
        };
        let position = track.pending.iter().position(|(id, _)| *id == request_id);
        if let Some(position) = position {
            track.pending.remove(position);
        }
        if error.is_none() && request_id > track.confirmed_request {
            track.confirmed = vote;
            track.confirmed_request = request_id;
        }

        // Responses for votes dropped by a post reload leave the fresh counts alone.
        let settled = track.settled();
        if position.is_some() && settled != track.shown {
            let shown = track.shown;
            track.shown = settled;
            debug!(item_id = %item_id, ?settled, "restoring vote after server response");
            self.store.dispatch(Action::ApplyVote {
                item_id: item_id.clone(),
                vote: settled,
                previous: shown,
            });
        }

        match error {
            None => SyncEvent::VoteAccepted { item_id },
            Some(error) => {
                warn!(item_id = %item_id, error = %error, "vote rejected");
                SyncEvent::VoteRejected { item_id, error }
            }
        }
    }

    /// Fresh server counts already include every accepted vote; in-flight
    /// votes on those items can no longer be rolled back against them.
    fn forget_pending_votes(&mut self, posts: &[ContentItem]) {
        for post in posts {
            if let Some(track) = self.votes.get_mut(&post.id) {
                track.pending.clear();
                track.shown = track.confirmed;
            }
        }
    }

    /// Fetches a Discourse topic; its reply forest arrives as [`SyncEvent::Thread`].
    pub fn load_thread(&mut self, topic_id: u64) -> Option<u64> {
        let service = self.services.threads.clone()?;
        let (request_id, cancel) = self.begin(Slot::Thread(topic_id));
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            if cancel.is_cancelled() {
                return;
            }
            let result = service.load_topic(topic_id);
            let _ = tx.send(SyncResponse::Thread {
                request_id,
                topic_id,
                result,
            });
        });
        Some(request_id)
    }

    pub fn poll(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(message) = self.response_rx.try_recv() {
            events.push(self.handle_response(message));
        }
        events
    }

    /// Blocks for the next response, up to `timeout`.
    pub fn wait(&mut self, timeout: Duration) -> Option<SyncEvent> {
        match self.response_rx.recv_timeout(timeout) {
            Ok(message) => Some(self.handle_response(message)),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    fn take_current(&mut self, slot: Slot, request_id: u64) -> bool {
        let Some(pending) = self.pending.get(&slot) else {
            return false;
        };
        if pending.cancel.is_cancelled() || pending.request_id != request_id {
            return false;
        }
        self.pending.remove(&slot);
        true
    }

    fn handle_response(&mut self, message: SyncResponse) -> SyncEvent {
        if let Some((slot, request_id)) = message.request() {
            if !self.take_current(slot, request_id) {
                debug!(?slot, request_id, "dropping stale response");
                return SyncEvent::Dropped(slot);
            }
        }

        match message {
            SyncResponse::Communities { result, .. } => {
                self.apply(Slot::Communities, result, |communities| {
                    info!(count = communities.len(), "communities refreshed");
                    Action::SetCommunities(communities)
                })
            }
            SyncResponse::Users { result, .. } => self.apply(Slot::Users, result, |users| {
                info!(count = users.len(), "users refreshed");
                Action::SetUsers(users)
            }),
            SyncResponse::ActiveCommunity {
                community, result, ..
            } => {
                let still_active = self.active_community_id() == Some(community.id);
                if !still_active {
                    debug!(community_id = community.id, "active community changed, dropping posts");
                    return SyncEvent::Dropped(Slot::ActiveCommunity);
                }
                if let Ok(posts) = &result {
                    self.forget_pending_votes(posts);
                }
                self.apply(Slot::ActiveCommunity, result, |posts| {
                    Action::SetActiveCommunity {
                        community,
                        posts: Some(posts),
                    }
                })
            }
            SyncResponse::Membership {
                community_id,
                result,
                ..
            } => self.apply(Slot::Membership(community_id), result, |member| {
                let joined = match member {
                    Some(user) => Joined::Member(user),
                    None => Joined::NotMember,
                };
                Action::UpdateCommunitiesJoined {
                    community_id,
                    joined,
                }
            }),
            SyncResponse::Thread {
                topic_id, result, ..
            } => match result {
                Ok(topic) => SyncEvent::Thread {
                    topic_id,
                    forest: build_reply_tree(topic.post_stream.posts),
                },
                Err(err) => self.failed(Slot::Thread(topic_id), err),
            },
            SyncResponse::Vote {
                request_id,
                item_id,
                vote,
                error,
            } => self.settle_vote(request_id, item_id, vote, error),
        }
    }

    fn apply<T>(&self, slot: Slot, result: Result<T>, action: impl FnOnce(T) -> Action) -> SyncEvent {
        match result {
            Ok(value) => {
                self.store.dispatch(action(value));
                SyncEvent::Applied(slot)
            }
            Err(err) => self.failed(slot, err),
        }
    }

    fn failed(&self, slot: Slot, err: anyhow::Error) -> SyncEvent {
        let error = format!("{err:#}");
        warn!(?slot, error = %error, "sync request failed");
        SyncEvent::Failed { slot, error }
    }
}
