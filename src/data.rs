use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;

use crate::api;
use crate::discourse;
use crate::model::{Community, ContentItem, Topic, User};
use crate::store::Vote;

pub trait CommunityService: Send + Sync {
    fn list_communities(&self) -> Result<Vec<Community>>;
}

pub trait UserService: Send + Sync {
    fn list_users(&self) -> Result<Vec<User>>;
}

pub trait ContentService: Send + Sync {
    fn list_posts(&self, group_id: u64) -> Result<Vec<ContentItem>>;
}

pub trait MembershipService: Send + Sync {
    fn resolve_member(&self, address: &str, group_id: u64) -> Result<Option<User>>;
}

pub trait VoteService: Send + Sync {
    fn vote(&self, item_id: &str, vote: Vote) -> Result<()>;
}

pub trait ThreadService: Send + Sync {
    fn load_topic(&self, topic_id: u64) -> Result<Topic>;
}

pub struct ApiCommunityService {
    client: Arc<api::Client>,
}

impl ApiCommunityService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl CommunityService for ApiCommunityService {
    fn list_communities(&self) -> Result<Vec<Community>> {
        self.client.communities()
    }
}

pub struct ApiUserService {
    client: Arc<api::Client>,
}

impl ApiUserService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl UserService for ApiUserService {
    fn list_users(&self) -> Result<Vec<User>> {
        self.client.users()
    }
}

pub struct ApiContentService {
    client: Arc<api::Client>,
}

impl ApiContentService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl ContentService for ApiContentService {
    fn list_posts(&self, group_id: u64) -> Result<Vec<ContentItem>> {
        self.client.posts(group_id)
    }
}

pub struct ApiMembershipService {
    client: Arc<api::Client>,
}

impl ApiMembershipService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl MembershipService for ApiMembershipService {
    fn resolve_member(&self, address: &str, group_id: u64) -> Result<Option<User>> {
        self.client
            .member(group_id, address)
            .context("resolve membership")
    }
}

pub struct ApiVoteService {
    client: Arc<api::Client>,
}

impl ApiVoteService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl VoteService for ApiVoteService {
    fn vote(&self, item_id: &str, vote: Vote) -> Result<()> {
        self.client.vote(item_id, vote)
    }
}

pub struct DiscourseThreadService {
    client: Arc<discourse::Client>,
}

impl DiscourseThreadService {
    pub fn new(client: Arc<discourse::Client>) -> Self {
        Self { client }
    }
}

impl ThreadService for DiscourseThreadService {
    fn load_topic(&self, topic_id: u64) -> Result<Topic> {
        self.client.topic(topic_id)
    }
}

/// In-memory backend for offline use and tests. Every trait reads the same data.
#[derive(Default)]
pub struct MockForum {
    pub communities: Mutex<Vec<Community>>,
    pub users: Mutex<Vec<User>>,
    pub posts: Mutex<HashMap<u64, Vec<ContentItem>>>,
    pub members: Mutex<HashMap<(u64, String), User>>,
    pub topics: Mutex<HashMap<u64, Topic>>,
    pub fail_votes: Mutex<bool>,
    membership_calls: AtomicUsize,
    vote_calls: AtomicUsize,
}

impl MockForum {
    pub fn membership_calls(&self) -> usize {
        self.membership_calls.load(Ordering::SeqCst)
    }

    pub fn vote_calls(&self) -> usize {
        self.vote_calls.load(Ordering::SeqCst)
    }
}

impl CommunityService for MockForum {
    fn list_communities(&self) -> Result<Vec<Community>> {
        Ok(self.communities.lock().clone())
    }
}

impl UserService for MockForum {
    fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.users.lock().clone())
    }
}

impl ContentService for MockForum {
    fn list_posts(&self, group_id: u64) -> Result<Vec<ContentItem>> {
        Ok(self
            .posts
            .lock()
            .get(&group_id)
            .cloned()
            .unwrap_or_default())
    }
}

impl MembershipService for MockForum {
    fn resolve_member(&self, address: &str, group_id: u64) -> Result<Option<User>> {
        self.membership_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .members
            .lock()
            .get(&(group_id, address.to_string()))
            .cloned())
    }
}

impl VoteService for MockForum {
    fn vote(&self, item_id: &str, _vote: Vote) -> Result<()> {
        self.vote_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_votes.lock() {
            return Err(anyhow!("vote on {item_id} rejected"));
        }
        Ok(())
    }
}

impl ThreadService for MockForum {
    fn load_topic(&self, topic_id: u64) -> Result<Topic> {
        self.topics
            .lock()
            .get(&topic_id)
            .cloned()
            .ok_or_else(|| anyhow!("topic {topic_id} not found"))
    }
}
