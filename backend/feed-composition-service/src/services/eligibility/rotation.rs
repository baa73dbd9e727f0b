use crate::models::{CompositionSeed, Post};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// Interleave posts across businesses with smooth weighted round-robin.
///
/// Businesses are visited in order of first appearance in `posts`. A
/// business's weight grows with the square root of its inventory and is capped
/// at `max_weight`, so a large advertiser gets more turns per round than a
/// business with a single post, but nowhere near proportionally more.
pub(crate) fn weighted_round_robin(posts: Vec<Post>, max_weight: u32) -> Vec<Post> {
    let mut order: Vec<Uuid> = Vec::new();
    let mut groups: HashMap<Uuid, VecDeque<Post>> = HashMap::new();
    for post in posts {
        let author = post.author_id;
        groups
            .entry(author)
            .or_insert_with(|| {
                order.push(author);
                VecDeque::new()
            })
            .push_back(post);
    }

    let mut lanes: Vec<Lane> = order
        .into_iter()
        .filter_map(|author| groups.remove(&author))
        .map(|queue| Lane {
            weight: business_weight(queue.len(), max_weight),
            current: 0,
            queue,
        })
        .collect();

    let total: usize = lanes.iter().map(|l| l.queue.len()).sum();
    let mut sequence = Vec::with_capacity(total);

    while !lanes.is_empty() {
        let total_weight: i64 = lanes.iter().map(|l| l.weight).sum();
        for lane in lanes.iter_mut() {
            lane.current += lane.weight;
        }

        // strict `>` keeps the earliest lane on ties
        let mut picked = 0;
        for (i, lane) in lanes.iter().enumerate().skip(1) {
            if lane.current > lanes[picked].current {
                picked = i;
            }
        }

        let lane = &mut lanes[picked];
        lane.current -= total_weight;
        if let Some(post) = lane.queue.pop_front() {
            sequence.push(post);
        }
        if lane.queue.is_empty() {
            lanes.remove(picked);
        }
    }

    sequence
}

struct Lane {
    weight: i64,
    current: i64,
    queue: VecDeque<Post>,
}

fn business_weight(inventory: usize, max_weight: u32) -> i64 {
    let root = (inventory as f64).sqrt().ceil() as i64;
    root.clamp(1, max_weight.max(1) as i64)
}

/// Rotating window over the round-robin sequence. Each page starts
/// `slot_count` items further along, wrapping at the end.
pub(crate) fn eligibility_window(
    sequence: &[Post],
    page: u32,
    slot_count: usize,
    multiplier: usize,
) -> Vec<Post> {
    let window_size = slot_count.saturating_mul(multiplier.max(1));
    if sequence.len() <= window_size {
        return sequence.to_vec();
    }

    let offset = (page as usize).wrapping_mul(slot_count) % sequence.len();
    sequence
        .iter()
        .cycle()
        .skip(offset)
        .take(window_size)
        .cloned()
        .collect()
}

/// Choose `slot_count` posts from `window` by lowest seed key, keeping window order.
pub(crate) fn pick_from_window(
    window: Vec<Post>,
    seed: &CompositionSeed,
    slot_count: usize,
) -> Vec<Post> {
    if window.len() <= slot_count {
        return window;
    }

    let mut keyed: Vec<(usize, u64)> = window
        .iter()
        .enumerate()
        .map(|(i, post)| (i, seed.selection_key(&post.id)))
        .collect();
    keyed.sort_by_key(|&(i, key)| (key, i));

    let mut chosen: Vec<usize> = keyed.into_iter().take(slot_count).map(|(i, _)| i).collect();
    chosen.sort_unstable();

    let mut window: Vec<Option<Post>> = window.into_iter().map(Some).collect();
    chosen
        .into_iter()
        .filter_map(|i| window[i].take())
        .collect()
}
