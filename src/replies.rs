//! Nests a flat Discourse post stream into reply threads.
//!
//! Parent links come from `reply_to_post_number`. When several posts share a
//! `post_number`, the last one in the stream owns that number and receives its
//! replies. References that resolve to nothing leave the post at the top level.
//! Reference cycles are broken: each post is placed exactly once, and a cycle
//! with no top-level ancestor is hoisted to the top level at its earliest post.

use std::collections::HashMap;

use crate::model::DiscoursePost;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyNode {
    pub post: DiscoursePost,
    pub replies: Vec<ReplyNode>,
}

impl Drop for ReplyNode {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.replies);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.replies);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadEntry<'a> {
    pub post: &'a DiscoursePost,
    pub depth: usize,
    pub descendants: usize,
}

pub fn build_reply_tree(posts: Vec<DiscoursePost>) -> Vec<ReplyNode> {
    let count = posts.len();
    let mut slots: HashMap<u64, usize> = HashMap::with_capacity(count);
    for (idx, post) in posts.iter().enumerate() {
        slots.insert(post.post_number, idx);
    }

    let parents: Vec<Option<usize>> = posts
        .iter()
        .map(|post| {
            post.reply_to_post_number
                .and_then(|number| slots.get(&number).copied())
        })
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (idx, parent) in parents.iter().enumerate() {
        if let Some(parent) = parent {
            children[*parent].push(idx);
        }
    }

    let mut visited = vec![false; count];
    let mut order = Vec::with_capacity(count);
    let mut roots = Vec::new();

    for idx in 0..count {
        if parents[idx].is_none() {
            roots.push(idx);
            mark_subtree(idx, &children, &mut visited, &mut order);
        }
    }

    // Whatever is still unvisited hangs off a cycle.
    for idx in 0..count {
        if visited[idx] {
            continue;
        }
        let root = cycle_entry(idx, &parents);
        roots.push(root);
        mark_subtree(root, &children, &mut visited, &mut order);
    }
    roots.sort_unstable();

    let mut pending: Vec<Option<DiscoursePost>> = posts.into_iter().map(Some).collect();
    let mut built: Vec<Option<ReplyNode>> = vec![None; count];
    for &idx in order.iter().rev() {
        let replies = children[idx]
            .iter()
            .filter_map(|child| built[*child].take())
            .collect();
        if let Some(post) = pending[idx].take() {
            built[idx] = Some(ReplyNode { post, replies });
        }
    }

    roots
        .into_iter()
        .filter_map(|idx| built[idx].take())
        .collect()
}

fn mark_subtree(
    root: usize,
    children: &[Vec<usize>],
    visited: &mut [bool],
    order: &mut Vec<usize>,
) {
    let mut stack = vec![root];
    visited[root] = true;
    while let Some(idx) = stack.pop() {
        order.push(idx);
        for &child in &children[idx] {
            if !visited[child] {
                visited[child] = true;
                stack.push(child);
            }
        }
    }
}

/// Earliest post of the cycle reached by walking up from `start`.
fn cycle_entry(start: usize, parents: &[Option<usize>]) -> usize {
    let mut seen: HashMap<usize, usize> = HashMap::new();
    let mut path = Vec::new();
    let mut current = start;
    loop {
        if let Some(&pos) = seen.get(&current) {
            return path[pos..].iter().copied().min().unwrap_or(current);
        }
        seen.insert(current, path.len());
        path.push(current);
        match parents[current] {
            Some(parent) => current = parent,
            None => return current,
        }
    }
}

/// Depth-first listing of a forest, with each post's total reply count.
pub fn flatten(forest: &[ReplyNode]) -> Vec<ThreadEntry<'_>> {
    let mut entries = Vec::new();
    let mut stack: Vec<(&ReplyNode, usize)> = forest.iter().rev().map(|node| (node, 0)).collect();
    while let Some((node, depth)) = stack.pop() {
        entries.push(ThreadEntry {
            post: &node.post,
            depth,
            descendants: 0,
        });
        stack.extend(node.replies.iter().rev().map(|reply| (reply, depth + 1)));
    }

    // In pre-order, a post's subtree ends at the next entry no deeper than it.
    let mut open: Vec<usize> = Vec::new();
    for idx in 0..entries.len() {
        while let Some(&top) = open.last() {
            if entries[top].depth < entries[idx].depth {
                break;
            }
            entries[top].descendants = idx - top - 1;
            open.pop();
        }
        open.push(idx);
    }
    let end = entries.len();
    for top in open {
        entries[top].descendants = end - top - 1;
    }
    entries
}
