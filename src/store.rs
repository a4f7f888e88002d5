use std::collections::HashMap;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::debug;

use crate::model::{Community, ContentItem, User};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Joined {
    Member(User),
    NotMember,
}

impl Joined {
    pub fn member(&self) -> Option<&User> {
        match self {
            Joined::Member(user) => Some(user),
            Joined::NotMember => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveCommunity {
    pub community: Community,
    /// `None` while the post list is still loading.
    pub posts: Option<Vec<ContentItem>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePost {
    pub community: Community,
    pub post: ContentItem,
    pub comments: Vec<ContentItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct State {
    pub communities: Vec<Community>,
    pub users: Vec<User>,
    pub users_grouped: HashMap<u64, Vec<User>>,
    pub active_community: Option<ActiveCommunity>,
    pub active_post: Option<ActivePost>,
    pub is_admin: bool,
    pub is_moderator: bool,
    pub communities_joined: HashMap<u64, Joined>,
}

impl State {
    pub fn community(&self, id: u64) -> Option<&Community> {
        self.communities.iter().find(|community| community.id == id)
    }

    pub fn members_of(&self, community_id: u64) -> &[User] {
        self.users_grouped
            .get(&community_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn joined(&self, community_id: u64) -> Option<&Joined> {
        self.communities_joined.get(&community_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Vote {
    Up,
    Down,
    #[default]
    None,
}

/// Voting the same direction twice withdraws the vote.
pub fn toggle_vote(previous: Vote, requested: Vote) -> Vote {
    if previous == requested {
        Vote::None
    } else {
        requested
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetCommunities(Vec<Community>),
    SetUsers(Vec<User>),
    SetActiveCommunity {
        community: Community,
        posts: Option<Vec<ContentItem>>,
    },
    ClearActiveCommunity,
    SetActivePost {
        community: Community,
        post: ContentItem,
        comments: Vec<ContentItem>,
    },
    UpdateCommunitiesJoined {
        community_id: u64,
        joined: Joined,
    },
    InvalidateJoined(u64),
    SetUserAccess {
        is_admin: Option<bool>,
        is_moderator: Option<bool>,
    },
    AddCommunity(Community),
    RemoveCommunity(u64),
    AddUser(User),
    RemoveUser(String),
    ApplyVote {
        item_id: String,
        vote: Vote,
        previous: Vote,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::SetCommunities(_) => "SET_COMMUNITIES",
            Action::SetUsers(_) => "SET_USERS",
            Action::SetActiveCommunity { .. } => "SET_ACTIVE_COMMUNITY",
            Action::ClearActiveCommunity => "CLEAR_ACTIVE_COMMUNITY",
            Action::SetActivePost { .. } => "SET_ACTIVE_POST",
            Action::UpdateCommunitiesJoined { .. } => "UPDATE_COMMUNITIES_JOINED",
            Action::InvalidateJoined(_) => "INVALIDATE_JOINED",
            Action::SetUserAccess { .. } => "SET_USER_ACCESS",
            Action::AddCommunity(_) => "ADD_COMMUNITY",
            Action::RemoveCommunity(_) => "REMOVE_COMMUNITY",
            Action::AddUser(_) => "ADD_USER",
            Action::RemoveUser(_) => "REMOVE_USER",
            Action::ApplyVote { .. } => "APPLY_VOTE",
        }
    }
}

/// Applies one action. Structural replace/merge only; payloads are not validated.
pub fn reduce(state: &mut State, action: Action) {
    match action {
        Action::SetCommunities(communities) => {
            state.communities = communities;
        }
        Action::SetUsers(users) => {
            state.users_grouped = group_users(&users);
            state.users = users;
        }
        Action::SetActiveCommunity { community, posts } => {
            state.active_community = Some(ActiveCommunity { community, posts });
        }
        Action::ClearActiveCommunity => {
            state.active_community = None;
        }
        Action::SetActivePost {
            community,
            post,
            comments,
        } => {
            state.active_post = Some(ActivePost {
                community,
                post,
                comments,
            });
        }
        Action::UpdateCommunitiesJoined {
            community_id,
            joined,
        } => {
            state.communities_joined.insert(community_id, joined);
        }
        Action::InvalidateJoined(community_id) => {
            state.communities_joined.remove(&community_id);
        }
        Action::SetUserAccess {
            is_admin,
            is_moderator,
        } => {
            if let Some(flag) = is_admin {
                state.is_admin = flag;
            }
            if let Some(flag) = is_moderator {
                state.is_moderator = flag;
            }
        }
        Action::AddCommunity(community) => {
            state.communities.push(community);
        }
        Action::RemoveCommunity(id) => {
            state.communities.retain(|community| community.id != id);
        }
        Action::AddUser(user) => {
            state
                .users_grouped
                .entry(user.group_id)
                .or_default()
                .push(user.clone());
            state.users.push(user);
        }
        Action::RemoveUser(id) => {
            state.users.retain(|user| user.id != id);
            state.users_grouped = group_users(&state.users);
        }
        Action::ApplyVote {
            item_id,
            vote,
            previous,
        } => {
            let patch = |item: &mut ContentItem| {
                if item.id == item_id {
                    adjust_counts(item, previous, vote);
                }
            };
            if let Some(active) = state.active_community.as_mut() {
                if let Some(posts) = active.posts.as_mut() {
                    posts.iter_mut().for_each(&patch);
                }
            }
            if let Some(active) = state.active_post.as_mut() {
                patch(&mut active.post);
                active.comments.iter_mut().for_each(&patch);
            }
        }
    }
}

fn group_users(users: &[User]) -> HashMap<u64, Vec<User>> {
    let mut grouped: HashMap<u64, Vec<User>> = HashMap::new();
    for user in users {
        grouped.entry(user.group_id).or_default().push(user.clone());
    }
    grouped
}

fn adjust_counts(item: &mut ContentItem, previous: Vote, next: Vote) {
    match previous {
        Vote::Up => item.upvotes = item.upvotes.saturating_sub(1),
        Vote::Down => item.downvotes = item.downvotes.saturating_sub(1),
        Vote::None => {}
    }
    match next {
        Vote::Up => item.upvotes = item.upvotes.saturating_add(1),
        Vote::Down => item.downvotes = item.downvotes.saturating_add(1),
        Vote::None => {}
    }
}

struct Inner {
    state: State,
    generation: u64,
}

/// Owned cache holding [`State`]. All mutation goes through [`Store::dispatch`].
pub struct Store {
    inner: Mutex<Inner>,
    subscribers: Mutex<Vec<Sender<u64>>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(State::default())
    }
}

impl Store {
    pub fn new(initial: State) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: initial,
                generation: 0,
            }),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn get_state(&self) -> State {
        self.inner.lock().state.clone()
    }

    /// Runs `f` against the current state without cloning it.
    pub fn read<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        f(&self.inner.lock().state)
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn dispatch(&self, action: Action) -> u64 {
        let name = action.name();
        let mut inner = self.inner.lock();
        reduce(&mut inner.state, action);
        inner.generation = inner.generation.wrapping_add(1);
        let generation = inner.generation;
        // Notified under the state lock so subscribers see generations in order.
        self.subscribers
            .lock()
            .retain(|tx| tx.send(generation).is_ok());
        drop(inner);
        debug!(action = name, generation, "dispatched");
        generation
    }

    /// Every subsequent dispatch sends its generation to the returned receiver.
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<u64> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn community(id: u64, name: &str) -> Community {
        Community {
            id,
            name: name.into(),
            ..Community::default()
        }
    }

    fn user(id: &str, group_id: u64) -> User {
        User {
            id: id.into(),
            name: format!("user-{id}"),
            identity_commitment: format!("commit-{id}"),
            group_id,
        }
    }

    fn item(id: &str, up: u64, down: u64) -> ContentItem {
        ContentItem {
            id: id.into(),
            group_id: 1,
            upvotes: up,
            downvotes: down,
            ..ContentItem::default()
        }
    }

    #[test]
    fn set_communities_replaces_without_merge() {
        let store = Store::default();
        store.dispatch(Action::SetCommunities(vec![community(1, "a"), community(2, "b")]));
        store.dispatch(Action::SetCommunities(vec![community(3, "c")]));
        let state = store.get_state();
        assert_eq!(state.communities, vec![community(3, "c")]);
    }

    #[test]
    fn set_users_groups_by_community() {
        let mut state = State::default();
        reduce(
            &mut state,
            Action::SetUsers(vec![user("a", 1), user("b", 2), user("c", 1)]),
        );
        let ids: Vec<&str> = state.members_of(1).iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(state.members_of(2).len(), 1);
        assert!(state.members_of(9).is_empty());

        reduce(&mut state, Action::SetUsers(vec![user("d", 2)]));
        assert!(state.members_of(1).is_empty());
        assert_eq!(state.users.len(), 1);
    }

    #[test]
    fn update_joined_twice_is_idempotent() {
        let mut once = State::default();
        let joined = Joined::Member(user("a", 5));
        reduce(
            &mut once,
            Action::UpdateCommunitiesJoined {
                community_id: 5,
                joined: joined.clone(),
            },
        );
        let mut twice = once.clone();
        reduce(
            &mut twice,
            Action::UpdateCommunitiesJoined {
                community_id: 5,
                joined,
            },
        );
        assert_eq!(once, twice);
        assert_eq!(
            twice.joined(5).and_then(Joined::member).map(|u| u.id.as_str()),
            Some("a")
        );

        reduce(&mut twice, Action::InvalidateJoined(5));
        assert!(twice.joined(5).is_none());
    }

    #[test]
    fn user_access_merges_partial_flags() {
        let mut state = State::default();
        reduce(
            &mut state,
            Action::SetUserAccess {
                is_admin: Some(true),
                is_moderator: None,
            },
        );
        reduce(
            &mut state,
            Action::SetUserAccess {
                is_admin: None,
                is_moderator: Some(true),
            },
        );
        assert!(state.is_admin);
        assert!(state.is_moderator);
    }

    #[test]
    fn add_and_remove_by_identifier() {
        let mut state = State::default();
        reduce(&mut state, Action::AddCommunity(community(1, "a")));
        reduce(&mut state, Action::AddCommunity(community(2, "b")));
        reduce(&mut state, Action::RemoveCommunity(1));
        assert_eq!(state.communities, vec![community(2, "b")]);

        reduce(&mut state, Action::AddUser(user("x", 2)));
        reduce(&mut state, Action::AddUser(user("y", 2)));
        assert_eq!(state.members_of(2).len(), 2);
        reduce(&mut state, Action::RemoveUser("x".into()));
        assert_eq!(state.users, vec![user("y", 2)]);
        assert_eq!(state.members_of(2), &[user("y", 2)]);
    }

    #[test]
    fn clear_active_community() {
        let mut state = State::default();
        reduce(
            &mut state,
            Action::SetActiveCommunity {
                community: community(1, "a"),
                posts: None,
            },
        );
        assert!(state.active_community.is_some());
        reduce(&mut state, Action::ClearActiveCommunity);
        assert!(state.active_community.is_none());
    }

    #[test]
    fn apply_vote_patches_every_copy_and_rolls_back() {
        let mut state = State::default();
        reduce(
            &mut state,
            Action::SetActiveCommunity {
                community: community(1, "a"),
                posts: Some(vec![item("p1", 2, 0), item("p2", 0, 0)]),
            },
        );
        reduce(
            &mut state,
            Action::SetActivePost {
                community: community(1, "a"),
                post: item("p1", 2, 0),
                comments: vec![item("c1", 0, 0)],
            },
        );

        reduce(
            &mut state,
            Action::ApplyVote {
                item_id: "p1".into(),
                vote: Vote::Down,
                previous: Vote::Up,
            },
        );
        let posts = state.active_community.as_ref().unwrap().posts.as_ref().unwrap();
        assert_eq!((posts[0].upvotes, posts[0].downvotes), (1, 1));
        assert_eq!((posts[1].upvotes, posts[1].downvotes), (0, 0));
        let post = &state.active_post.as_ref().unwrap().post;
        assert_eq!((post.upvotes, post.downvotes), (1, 1));

        reduce(
            &mut state,
            Action::ApplyVote {
                item_id: "p1".into(),
                vote: Vote::Up,
                previous: Vote::Down,
            },
        );
        let post = &state.active_post.as_ref().unwrap().post;
        assert_eq!((post.upvotes, post.downvotes), (2, 0));
    }

    #[test]
    fn toggle_withdraws_repeated_vote() {
        assert_eq!(toggle_vote(Vote::Up, Vote::Up), Vote::None);
        assert_eq!(toggle_vote(Vote::Down, Vote::Up), Vote::Up);
        assert_eq!(toggle_vote(Vote::None, Vote::Down), Vote::Down);
    }

    #[test]
    fn subscribers_see_generations_in_order() {
        let store = Store::default();
        let rx = store.subscribe();
        store.dispatch(Action::SetCommunities(vec![]));
        store.dispatch(Action::ClearActiveCommunity);
        assert_eq!(rx.try_recv().unwrap(), 1);
        assert_eq!(rx.try_recv().unwrap(), 2);
        assert!(rx.try_recv().is_err());

        drop(rx);
        store.dispatch(Action::ClearActiveCommunity);
        assert!(store.subscribers.lock().is_empty());
        assert_eq!(store.generation(), 3);
    }

    #[test]
    fn concurrent_dispatches_notify_in_order() {
        let store = std::sync::Arc::new(Store::default());
        let rx = store.subscribe();
        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for n in 0..250 {
                        store.dispatch(Action::AddUser(user(&format!("{worker}-{n}"), worker)));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let seen: Vec<u64> = rx.try_iter().collect();
        assert_eq!(seen, (1..=1000).collect::<Vec<u64>>());
        assert_eq!(store.get_state().users.len(), 1000);
    }

    #[test]
    fn vote_on_saturated_counts_does_not_overflow() {
        let mut state = State::default();
        reduce(
            &mut state,
            Action::SetActiveCommunity {
                community: community(1, "one"),
                posts: Some(vec![ContentItem {
                    id: "p1".into(),
                    group_id: 1,
                    upvotes: u64::MAX,
                    ..ContentItem::default()
                }]),
            },
        );
        reduce(
            &mut state,
            Action::ApplyVote {
                item_id: "p1".into(),
                vote: Vote::Up,
                previous: Vote::None,
            },
        );
        let posts = state.active_community.unwrap().posts.unwrap();
        assert_eq!(posts[0].upvotes, u64::MAX);
    }
}
