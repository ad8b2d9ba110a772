//! An intrusive, splay-tree-style ordered map.
//!
//! Nodes embed their own left/right/parent header inline, indexed by
//! key, with a splay-to-root after every successful find/insert, and
//! an in-order walk implemented with Morris threading so the GC can
//! traverse it without recursion or an auxiliary stack. Node storage
//! here is an arena (`Vec<Option<Node<K, V>>>`) addressed by `u32`
//! index rather than a raw pointer, same tradeoff as `pool.rs`.
//! Wrapping each slot in `Option`, rather than a union with a
//! free-list header, is what lets `remove` hand the stored value back
//! to the caller with an ordinary `Option::take`.
//!
//! `K`'s `Ord` impl supplies the comparator: `Oop`'s is identity-based,
//! `String`/`str` keys are lexicographic by construction.

use std::cmp::Ordering;

struct Node<K, V> {
  left: Option<u32>,
  right: Option<u32>,
  parent: Option<u32>,
  key: K,
  value: V,
}

pub struct OrderedMap<K, V> {
  nodes: Vec<Option<Node<K, V>>>,
  free: Vec<u32>,
  root: Option<u32>,
  len: usize,
}

impl<K: Ord, V> Default for OrderedMap<K, V> {
  fn default() -> Self {
    OrderedMap { nodes: Vec::new(), free: Vec::new(), root: None, len: 0 }
  }
}

impl<K: Ord, V> OrderedMap<K, V> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  fn node(&self, i: u32) -> &Node<K, V> {
    self.nodes[i as usize].as_ref().expect("index refers to a live node")
  }

  fn node_mut(&mut self, i: u32) -> &mut Node<K, V> {
    self.nodes[i as usize].as_mut().expect("index refers to a live node")
  }

  fn left(&self, i: u32) -> Option<u32> {
    self.node(i).left
  }

  fn right(&self, i: u32) -> Option<u32> {
    self.node(i).right
  }

  fn parent(&self, i: u32) -> Option<u32> {
    self.node(i).parent
  }

  fn set_left(&mut self, i: u32, v: Option<u32>) {
    self.node_mut(i).left = v;
  }

  fn set_right(&mut self, i: u32, v: Option<u32>) {
    self.node_mut(i).right = v;
  }

  fn set_parent(&mut self, i: u32, v: Option<u32>) {
    self.node_mut(i).parent = v;
  }

  fn new_node(&mut self, key: K, value: V, parent: Option<u32>) -> u32 {
    let node = Node { left: None, right: None, parent, key, value };
    if let Some(idx) = self.free.pop() {
      self.nodes[idx as usize] = Some(node);
      idx
    } else {
      self.nodes.push(Some(node));
      (self.nodes.len() - 1) as u32
    }
  }

  fn rotate_left(&mut self, x: u32) {
    let y = self.right(x).expect("rotate_left requires a right child");
    let y_left = self.left(y);
    self.set_right(x, y_left);
    if let Some(yl) = y_left {
      self.set_parent(yl, Some(x));
    }
    let x_parent = self.parent(x);
    self.set_parent(y, x_parent);
    match x_parent {
      None => self.root = Some(y),
      Some(p) if self.left(p) == Some(x) => self.set_left(p, Some(y)),
      Some(p) => self.set_right(p, Some(y)),
    }
    self.set_left(y, Some(x));
    self.set_parent(x, Some(y));
  }

  fn rotate_right(&mut self, x: u32) {
    let y = self.left(x).expect("rotate_right requires a left child");
    let y_right = self.right(y);
    self.set_left(x, y_right);
    if let Some(yr) = y_right {
      self.set_parent(yr, Some(x));
    }
    let x_parent = self.parent(x);
    self.set_parent(y, x_parent);
    match x_parent {
      None => self.root = Some(y),
      Some(p) if self.left(p) == Some(x) => self.set_left(p, Some(y)),
      Some(p) => self.set_right(p, Some(y)),
    }
    self.set_right(y, Some(x));
    self.set_parent(x, Some(y));
  }

  /// Rotates `x` to the root of its (sub)tree. Terminates naturally once
  /// `x` has no parent, so it also doubles as the "splay within a
  /// detached subtree" step `remove` needs when joining the two halves.
  fn splay(&mut self, x: u32) {
    while let Some(p) = self.parent(x) {
      match self.parent(p) {
        None => {
          if self.left(p) == Some(x) {
            self.rotate_right(p);
          } else {
            self.rotate_left(p);
          }
        }
        Some(g) => {
          let p_is_left = self.left(g) == Some(p);
          let x_is_left = self.left(p) == Some(x);
          match (p_is_left, x_is_left) {
            (true, true) => {
              self.rotate_right(g);
              self.rotate_right(p);
            }
            (false, false) => {
              self.rotate_left(g);
              self.rotate_left(p);
            }
            (true, false) => {
              self.rotate_left(p);
              self.rotate_right(g);
            }
            (false, true) => {
              self.rotate_right(p);
              self.rotate_left(g);
            }
          }
        }
      }
    }
  }

  fn find_index(&self, key: &K) -> Option<u32> {
    let mut cur = self.root;
    while let Some(c) = cur {
      match key.cmp(&self.node(c).key) {
        Ordering::Equal => return Some(c),
        Ordering::Less => cur = self.left(c),
        Ordering::Greater => cur = self.right(c),
      }
    }
    None
  }

  /// Looks up `key`, splaying it to the root on a hit so repeated lookups
  /// of the same selector amortize to near-constant time.
  pub fn find(&mut self, key: &K) -> Option<&V> {
    let idx = self.find_index(key)?;
    self.splay(idx);
    Some(&self.node(idx).value)
  }

  pub fn contains(&self, key: &K) -> bool {
    self.find_index(key).is_some()
  }

  /// Inserts `key -> value`. Returns `false` (and drops `value`) if the
  /// key was already present: duplicate insertion is silently ignored,
  /// not an error.
  pub fn insert(&mut self, key: K, value: V) -> bool {
    let Some(mut root) = self.root else {
      let idx = self.new_node(key, value, None);
      self.root = Some(idx);
      self.len = 1;
      return true;
    };
    loop {
      match key.cmp(&self.node(root).key) {
        Ordering::Equal => return false,
        Ordering::Less => match self.left(root) {
          Some(l) => root = l,
          None => {
            let idx = self.new_node(key, value, Some(root));
            self.set_left(root, Some(idx));
            self.splay(idx);
            self.len += 1;
            return true;
          }
        },
        Ordering::Greater => match self.right(root) {
          Some(r) => root = r,
          None => {
            let idx = self.new_node(key, value, Some(root));
            self.set_right(root, Some(idx));
            self.splay(idx);
            self.len += 1;
            return true;
          }
        },
      }
    }
  }

  fn join(&mut self, l: Option<u32>, r: Option<u32>) -> Option<u32> {
    match (l, r) {
      (None, r) => r,
      (l, None) => l,
      (Some(l), Some(r)) => {
        let mut cur = l;
        while let Some(right) = self.right(cur) {
          cur = right;
        }
        self.splay(cur);
        self.set_right(cur, Some(r));
        self.set_parent(r, Some(cur));
        Some(cur)
      }
    }
  }

  pub fn remove(&mut self, key: &K) -> Option<V> {
    let idx = self.find_index(key)?;
    self.splay(idx);
    debug_assert_eq!(self.root, Some(idx));
    let l = self.left(idx);
    let r = self.right(idx);
    if let Some(l) = l {
      self.set_parent(l, None);
    }
    if let Some(r) = r {
      self.set_parent(r, None);
    }
    self.root = self.join(l, r);
    self.free.push(idx);
    self.len -= 1;
    let node = self.nodes[idx as usize].take().expect("removed index was live");
    Some(node.value)
  }

  /// Morris in-order traversal: no recursion, no auxiliary stack, at the
  /// cost of briefly threading and un-threading right pointers. This is
  /// the shape the GC relies on to walk a method dictionary or the
  /// global scope while marking/rewriting. Threading is done against a
  /// scratch copy of the pointer table so the read-only variant can keep
  /// a `&self` signature.
  pub fn for_each_inorder(&self, mut visit: impl FnMut(&K, &V)) {
    let mut right: Vec<Option<u32>> = self.nodes.iter().map(|n| n.as_ref().map(|n| n.right).unwrap_or(None)).collect();
    let left = |i: u32| self.node(i).left;
    let mut cur = self.root;
    while let Some(c) = cur {
      match left(c) {
        None => {
          visit(&self.node(c).key, &self.node(c).value);
          cur = right[c as usize];
        }
        Some(l) => {
          let mut pred = l;
          while let Some(r) = right[pred as usize] {
            if r == c {
              break;
            }
            pred = r;
          }
          if right[pred as usize].is_none() {
            right[pred as usize] = Some(c);
            cur = Some(l);
          } else {
            right[pred as usize] = None;
            visit(&self.node(c).key, &self.node(c).value);
            cur = right[c as usize];
          }
        }
      }
    }
  }

  /// Same traversal, yielding mutable values. Used by the collector to
  /// rewrite every stored reference after compaction.
  pub fn for_each_value_mut(&mut self, mut visit: impl FnMut(&mut V)) {
    let mut right: Vec<Option<u32>> = self.nodes.iter().map(|n| n.as_ref().map(|n| n.right).unwrap_or(None)).collect();
    let left: Vec<Option<u32>> = self.nodes.iter().map(|n| n.as_ref().map(|n| n.left).unwrap_or(None)).collect();
    let mut cur = self.root;
    while let Some(c) = cur {
      match left[c as usize] {
        None => {
          visit(&mut self.node_mut(c).value);
          cur = right[c as usize];
        }
        Some(l) => {
          let mut pred = l;
          while let Some(r) = right[pred as usize] {
            if r == c {
              break;
            }
            pred = r;
          }
          if right[pred as usize].is_none() {
            right[pred as usize] = Some(c);
            cur = Some(l);
          } else {
            right[pred as usize] = None;
            visit(&mut self.node_mut(c).value);
            cur = right[c as usize];
          }
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn insert_find_splays_to_root() {
    let mut m = OrderedMap::new();
    assert!(m.insert(5, "five"));
    assert!(m.insert(2, "two"));
    assert!(m.insert(8, "eight"));
    assert!(!m.insert(2, "duplicate"));
    assert_eq!(m.find(&2), Some(&"two"));
    assert_eq!(m.root, Some(m.find_index(&2).unwrap()));
  }

  #[test]
  fn inorder_is_sorted() {
    let mut m = OrderedMap::new();
    for k in [5, 1, 9, 3, 7, 2, 8, 4, 6] {
      m.insert(k, k * 10);
    }
    let mut seen = Vec::new();
    m.for_each_inorder(|k, v| seen.push((*k, *v)));
    assert_eq!(seen, vec![(1, 10), (2, 20), (3, 30), (4, 40), (5, 50), (6, 60), (7, 70), (8, 80), (9, 90)]);
  }

  #[test]
  fn remove_preserves_order_and_reuses_slot() {
    let mut m = OrderedMap::new();
    for k in 0..20 {
      m.insert(k, k);
    }
    for k in (0..20).step_by(2) {
      assert_eq!(m.remove(&k), Some(k));
    }
    let mut seen = Vec::new();
    m.for_each_inorder(|k, _| seen.push(*k));
    assert_eq!(seen, (1..20).step_by(2).collect::<Vec<_>>());
    assert_eq!(m.len(), 10);
  }

  #[test]
  fn remove_missing_key_is_noop() {
    let mut m: OrderedMap<i32, i32> = OrderedMap::new();
    m.insert(1, 1);
    assert_eq!(m.remove(&42), None);
    assert_eq!(m.len(), 1);
  }
}
