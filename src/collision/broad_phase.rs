//! Pair management on top of the dynamic tree.
//!
//! Only proxies that were created or re-inserted since the last update are
//! queried, so pairs whose proxies stayed inside their fat AABBs are never
//! re-examined. Pairs are reported once each, in sorted order.

use crate::collision::aabb::{RayCastInput, AABB};
use crate::collision::dynamic_tree::{DynamicTree, ProxyId};
use crate::math::vec2::Vec2;

#[derive(Debug, Clone)]
pub struct BroadPhase<T> {
    tree: DynamicTree<T>,
    move_buffer: Vec<ProxyId>,
    pair_buffer: Vec<(ProxyId, ProxyId)>,
}

impl<T: Copy> Default for BroadPhase<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> BroadPhase<T> {
    pub fn new() -> Self {
        BroadPhase {
            tree: DynamicTree::new(),
            move_buffer: Vec::with_capacity(16),
            pair_buffer: Vec::with_capacity(16),
        }
    }

    /// Adds a proxy. It takes part in the next [`update_pairs`](Self::update_pairs).
    pub fn create_proxy(&mut self, aabb: AABB, user_data: T) -> ProxyId {
        let proxy = self.tree.create_proxy(aabb, user_data);
        self.move_buffer.push(proxy);
        proxy
    }

    /// Removes a proxy. Pairs it was part of are not reported again.
    pub fn destroy_proxy(&mut self, proxy: ProxyId) {
        self.move_buffer.retain(|p| *p != proxy);
        self.tree.destroy_proxy(proxy);
    }

    /// Updates a proxy after its shape moved. Only buffers the proxy for pair
    /// search when the tree had to re-insert it.
    pub fn move_proxy(&mut self, proxy: ProxyId, aabb: AABB, displacement: Vec2) {
        if self.tree.move_proxy(proxy, aabb, displacement) {
            self.move_buffer.push(proxy);
        }
    }

    /// Forces pair search for a proxy on the next update, e.g. after a filter change.
    pub fn touch_proxy(&mut self, proxy: ProxyId) {
        self.move_buffer.push(proxy);
    }

    pub fn test_overlap(&self, proxy_a: ProxyId, proxy_b: ProxyId) -> bool {
        self.tree.fat_aabb(proxy_a).overlaps(&self.tree.fat_aabb(proxy_b))
    }

    pub fn fat_aabb(&self, proxy: ProxyId) -> AABB {
        self.tree.fat_aabb(proxy)
    }

    pub fn user_data(&self, proxy: ProxyId) -> Option<T> {
        self.tree.user_data(proxy)
    }

    pub fn proxy_count(&self) -> usize {
        self.tree.proxy_count()
    }

    pub fn tree(&self) -> &DynamicTree<T> {
        &self.tree
    }

    /// Reports every new overlapping pair involving a moved proxy exactly once.
    pub fn update_pairs<F: FnMut(T, T)>(&mut self, mut callback: F) {
        self.pair_buffer.clear();

        let tree = &self.tree;
        let pairs = &mut self.pair_buffer;
        for &query_proxy in &self.move_buffer {
            let fat = tree.fat_aabb(query_proxy);
            tree.query(&fat, |proxy| {
                // A proxy cannot form a pair with itself.
                if proxy != query_proxy {
                    pairs.push((proxy.min(query_proxy), proxy.max(query_proxy)));
                }
                true
            });
        }
        self.move_buffer.clear();

        self.pair_buffer.sort_unstable();
        self.pair_buffer.dedup();

        for &(a, b) in &self.pair_buffer {
            if let (Some(user_a), Some(user_b)) = (self.tree.user_data(a), self.tree.user_data(b)) {
                callback(user_a, user_b);
            }
        }
    }

    pub fn query<F: FnMut(ProxyId) -> bool>(&self, aabb: &AABB, callback: F) {
        self.tree.query(aabb, callback);
    }

    pub fn ray_cast<F: FnMut(&RayCastInput, ProxyId) -> f64>(&self, input: &RayCastInput, callback: F) {
        self.tree.ray_cast(input, callback);
    }
}
