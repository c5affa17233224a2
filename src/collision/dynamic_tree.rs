//! Dynamic AABB tree.
//!
//! A binary tree of fattened AABBs. Leaves are proxies; internal nodes hold the
//! union of their children. Insertion picks a sibling with the perimeter
//! heuristic and both insertion and removal rebalance with AVL-style rotations,
//! so queries stay logarithmic. A proxy only moves in the tree when its tight
//! AABB escapes the fat one.

use crate::collision::aabb::{RayCastInput, AABB};
use crate::common::settings::{AABB_EXTENSION, AABB_MULTIPLIER};
use crate::math::vec2::Vec2;

/// Null node sentinel.
pub const NULL_NODE: usize = usize::MAX;

pub type ProxyId = usize;

#[derive(Debug, Clone)]
struct TreeNode<T> {
    /// Fat AABB.
    aabb: AABB,
    user_data: Option<T>,
    /// Parent for live nodes.
    parent: usize,
    child1: usize,
    child2: usize,
    /// Leaf = 0, free node = -1.
    height: i32,
}

impl<T> TreeNode<T> {
    fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

#[derive(Debug, Clone)]
pub struct DynamicTree<T> {
    nodes: Vec<TreeNode<T>>,
    free_list: Vec<usize>,
    root: usize,
    proxy_count: usize,
}

impl<T: Copy> Default for DynamicTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> DynamicTree<T> {
    pub fn new() -> Self {
        DynamicTree {
            nodes: Vec::with_capacity(16),
            free_list: Vec::new(),
            root: NULL_NODE,
            proxy_count: 0,
        }
    }

    fn allocate_node(&mut self) -> usize {
        let node = TreeNode {
            aabb: AABB::default(),
            user_data: None,
            parent: NULL_NODE,
            child1: NULL_NODE,
            child2: NULL_NODE,
            height: 0,
        };
        match self.free_list.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn free_node(&mut self, id: usize) {
        let node = &mut self.nodes[id];
        node.height = -1;
        node.user_data = None;
        node.parent = NULL_NODE;
        node.child1 = NULL_NODE;
        node.child2 = NULL_NODE;
        self.free_list.push(id);
    }

    /// Creates a proxy whose fat AABB is `aabb` grown by [`AABB_EXTENSION`].
    pub fn create_proxy(&mut self, aabb: AABB, user_data: T) -> ProxyId {
        let id = self.allocate_node();
        self.nodes[id].aabb = aabb.fattened(AABB_EXTENSION);
        self.nodes[id].user_data = Some(user_data);
        self.nodes[id].height = 0;
        self.insert_leaf(id);
        self.proxy_count += 1;
        id
    }

    pub fn destroy_proxy(&mut self, proxy: ProxyId) {
        debug_assert!(proxy < self.nodes.len() && self.nodes[proxy].is_leaf());
        self.remove_leaf(proxy);
        self.free_node(proxy);
        self.proxy_count -= 1;
    }

    /// Re-inserts the proxy if `aabb` escaped its fat AABB. The new fat AABB is
    /// extended along `displacement` to anticipate further motion. Returns true
    /// when the proxy was re-inserted.
    pub fn move_proxy(&mut self, proxy: ProxyId, aabb: AABB, displacement: Vec2) -> bool {
        debug_assert!(self.nodes[proxy].is_leaf());
        if self.nodes[proxy].aabb.contains(&aabb) {
            return false;
        }

        self.remove_leaf(proxy);

        let mut b = aabb.fattened(AABB_EXTENSION);
        let d = displacement * AABB_MULTIPLIER;
        if d.x < 0.0 {
            b.min.x += d.x;
        } else {
            b.max.x += d.x;
        }
        if d.y < 0.0 {
            b.min.y += d.y;
        } else {
            b.max.y += d.y;
        }
        self.nodes[proxy].aabb = b;

        self.insert_leaf(proxy);
        true
    }

    pub fn user_data(&self, proxy: ProxyId) -> Option<T> {
        self.nodes.get(proxy).and_then(|n| n.user_data)
    }

    pub fn fat_aabb(&self, proxy: ProxyId) -> AABB {
        self.nodes[proxy].aabb
    }

    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    /// Visits every proxy whose fat AABB overlaps `aabb`. The callback returns
    /// false to stop the query.
    pub fn query<F: FnMut(ProxyId) -> bool>(&self, aabb: &AABB, mut callback: F) {
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            if node_id == NULL_NODE {
                continue;
            }
            let node = &self.nodes[node_id];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                if !callback(node_id) {
                    return;
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Casts a ray against the proxies. The callback receives the clipped input
    /// and returns the new max fraction: 0 terminates, a negative value ignores
    /// the proxy, and anything else clips the ray.
    pub fn ray_cast<F: FnMut(&RayCastInput, ProxyId) -> f64>(&self, input: &RayCastInput, mut callback: F) {
        let p1 = input.p1;
        let p2 = input.p2;
        let r = (p2 - p1).normalize();
        if r == Vec2::ZERO {
            return;
        }

        // Separating axis for the segment: |dot(v, p1 - c)| > dot(|v|, h).
        let v = Vec2::scalar_cross(1.0, r);
        let abs_v = v.abs();

        let mut max_fraction = input.max_fraction;
        let segment_aabb = |fraction: f64| {
            let t = p1 + (p2 - p1) * fraction;
            AABB::new(p1.min(t), p1.max(t))
        };
        let mut seg = segment_aabb(max_fraction);

        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            if node_id == NULL_NODE {
                continue;
            }
            let node = &self.nodes[node_id];
            if !node.aabb.overlaps(&seg) {
                continue;
            }

            let c = node.aabb.center();
            let h = node.aabb.extents();
            let separation = v.dot(p1 - c).abs() - abs_v.dot(h);
            if separation > 0.0 {
                continue;
            }

            if node.is_leaf() {
                let sub_input = RayCastInput {
                    p1,
                    p2,
                    max_fraction,
                };
                let value = callback(&sub_input, node_id);
                if value == 0.0 {
                    // The client has terminated the ray cast.
                    return;
                }
                if value > 0.0 {
                    max_fraction = value;
                    seg = segment_aabb(max_fraction);
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    fn insert_leaf(&mut self, leaf: usize) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf].parent = NULL_NODE;
            return;
        }

        // Find the best sibling for this node.
        let leaf_aabb = self.nodes[leaf].aabb;
        let mut index = self.root;
        while !self.nodes[index].is_leaf() {
            let node = &self.nodes[index];
            let child1 = node.child1;
            let child2 = node.child2;

            let area = node.aabb.perimeter();
            let combined_area = node.aabb.combine(&leaf_aabb).perimeter();

            // Cost of creating a new parent for this node and the new leaf.
            let cost = 2.0 * combined_area;
            // Minimum cost of pushing the leaf further down the tree.
            let inheritance_cost = 2.0 * (combined_area - area);

            let descend_cost = |child: usize| {
                let child_node = &self.nodes[child];
                let combined = leaf_aabb.combine(&child_node.aabb);
                if child_node.is_leaf() {
                    combined.perimeter() + inheritance_cost
                } else {
                    combined.perimeter() - child_node.aabb.perimeter() + inheritance_cost
                }
            };
            let cost1 = descend_cost(child1);
            let cost2 = descend_cost(child2);

            if cost < cost1 && cost < cost2 {
                break;
            }
            index = if cost1 < cost2 { child1 } else { child2 };
        }

        let sibling = index;
        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.allocate_node();
        self.nodes[new_parent].parent = old_parent;
        self.nodes[new_parent].aabb = leaf_aabb.combine(&self.nodes[sibling].aabb);
        self.nodes[new_parent].height = self.nodes[sibling].height + 1;
        self.nodes[new_parent].child1 = sibling;
        self.nodes[new_parent].child2 = leaf;
        self.nodes[sibling].parent = new_parent;
        self.nodes[leaf].parent = new_parent;

        if old_parent != NULL_NODE {
            if self.nodes[old_parent].child1 == sibling {
                self.nodes[old_parent].child1 = new_parent;
            } else {
                self.nodes[old_parent].child2 = new_parent;
            }
        } else {
            self.root = new_parent;
        }

        // Walk back up fixing heights and AABBs.
        self.refit_from(self.nodes[leaf].parent);
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf].parent;
        let grand_parent = self.nodes[parent].parent;
        let sibling = if self.nodes[parent].child1 == leaf {
            self.nodes[parent].child2
        } else {
            self.nodes[parent].child1
        };

        if grand_parent != NULL_NODE {
            // Destroy parent and connect sibling to grandparent.
            if self.nodes[grand_parent].child1 == parent {
                self.nodes[grand_parent].child1 = sibling;
            } else {
                self.nodes[grand_parent].child2 = sibling;
            }
            self.nodes[sibling].parent = grand_parent;
            self.free_node(parent);
            self.refit_from(grand_parent);
        } else {
            self.root = sibling;
            self.nodes[sibling].parent = NULL_NODE;
            self.free_node(parent);
        }
        self.nodes[leaf].parent = NULL_NODE;
    }

    fn refit_from(&mut self, start: usize) {
        let mut index = start;
        while index != NULL_NODE {
            index = self.balance(index);

            let child1 = self.nodes[index].child1;
            let child2 = self.nodes[index].child2;
            debug_assert!(child1 != NULL_NODE && child2 != NULL_NODE);

            self.nodes[index].height = 1 + self.nodes[child1].height.max(self.nodes[child2].height);
            self.nodes[index].aabb = self.nodes[child1].aabb.combine(&self.nodes[child2].aabb);

            index = self.nodes[index].parent;
        }
    }

    /// Performs a left or right rotation if node `i_a` is imbalanced.
    /// Returns the new root index of the subtree.
    fn balance(&mut self, i_a: usize) -> usize {
        if self.nodes[i_a].is_leaf() || self.nodes[i_a].height < 2 {
            return i_a;
        }

        let i_b = self.nodes[i_a].child1;
        let i_c = self.nodes[i_a].child2;
        let balance = self.nodes[i_c].height - self.nodes[i_b].height;

        if balance > 1 {
            self.rotate_up(i_a, i_c, i_b, false)
        } else if balance < -1 {
            self.rotate_up(i_a, i_b, i_c, true)
        } else {
            i_a
        }
    }

    /// Lifts child `i_up` of `i_a` into `i_a`'s place. `i_keep` is `i_a`'s other
    /// child. `up_was_child1` says which slot of `i_a` `i_up` occupied.
    fn rotate_up(&mut self, i_a: usize, i_up: usize, i_keep: usize, up_was_child1: bool) -> usize {
        let i_f = self.nodes[i_up].child1;
        let i_g = self.nodes[i_up].child2;

        // Swap A and the lifted node.
        self.nodes[i_up].child1 = i_a;
        self.nodes[i_up].parent = self.nodes[i_a].parent;
        self.nodes[i_a].parent = i_up;

        let up_parent = self.nodes[i_up].parent;
        if up_parent != NULL_NODE {
            if self.nodes[up_parent].child1 == i_a {
                self.nodes[up_parent].child1 = i_up;
            } else {
                self.nodes[up_parent].child2 = i_up;
            }
        } else {
            self.root = i_up;
        }

        // The taller grandchild stays with the lifted node, the shorter moves under A.
        let (i_stay, i_move) = if self.nodes[i_f].height > self.nodes[i_g].height {
            (i_f, i_g)
        } else {
            (i_g, i_f)
        };

        self.nodes[i_up].child2 = i_stay;
        if up_was_child1 {
            self.nodes[i_a].child1 = i_move;
        } else {
            self.nodes[i_a].child2 = i_move;
        }
        self.nodes[i_move].parent = i_a;

        self.nodes[i_a].aabb = self.nodes[i_keep].aabb.combine(&self.nodes[i_move].aabb);
        self.nodes[i_up].aabb = self.nodes[i_a].aabb.combine(&self.nodes[i_stay].aabb);
        self.nodes[i_a].height = 1 + self.nodes[i_keep].height.max(self.nodes[i_move].height);
        self.nodes[i_up].height = 1 + self.nodes[i_a].height.max(self.nodes[i_stay].height);

        i_up
    }

    /// Height of the tree, 0 when empty or a single leaf.
    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root].height
        }
    }

    /// Largest height difference between siblings anywhere in the tree.
    pub fn max_balance(&self) -> i32 {
        self.nodes
            .iter()
            .filter(|n| n.height > 1)
            .map(|n| (self.nodes[n.child2].height - self.nodes[n.child1].height).abs())
            .max()
            .unwrap_or(0)
    }

    /// Sum of node perimeters over the root perimeter.
    pub fn area_ratio(&self) -> f64 {
        if self.root == NULL_NODE {
            return 0.0;
        }
        let root_area = self.nodes[self.root].aabb.perimeter();
        let total: f64 = self
            .nodes
            .iter()
            .filter(|n| n.height >= 0)
            .map(|n| n.aabb.perimeter())
            .sum();
        total / root_area
    }

    fn compute_height(&self, node_id: usize) -> i32 {
        let node = &self.nodes[node_id];
        if node.is_leaf() {
            return 0;
        }
        1 + self.compute_height(node.child1).max(self.compute_height(node.child2))
    }

    /// Checks parent links, stored heights and that every internal AABB is the
    /// union of its children. Intended for tests and debug assertions.
    pub fn validate(&self) -> bool {
        if self.root == NULL_NODE {
            return self.proxy_count == 0;
        }
        if self.nodes[self.root].parent != NULL_NODE {
            return false;
        }
        self.validate_node(self.root) && self.compute_height(self.root) == self.height()
    }

    fn validate_node(&self, index: usize) -> bool {
        let node = &self.nodes[index];
        if node.is_leaf() {
            return node.child2 == NULL_NODE && node.height == 0 && node.user_data.is_some();
        }
        let (c1, c2) = (node.child1, node.child2);
        if self.nodes[c1].parent != index || self.nodes[c2].parent != index {
            return false;
        }
        let height = 1 + self.nodes[c1].height.max(self.nodes[c2].height);
        if node.height != height {
            return false;
        }
        let union = self.nodes[c1].aabb.combine(&self.nodes[c2].aabb);
        if union != node.aabb {
            return false;
        }
        self.validate_node(c1) && self.validate_node(c2)
    }
}
