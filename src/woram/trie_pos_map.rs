// This source code is dual-licensed under either the MIT license or the
// Apache License, Version 2.0, at your option.

//! A [`PositionMap`] realized as a balanced `K`-ary pointer trie whose leaves
//! are the positions `load` returns and whose internal nodes live in a
//! smaller WORAM of their own. Addressing every node directly by its
//! logical index (rather than hiding that index behind a further recursive
//! position map) would leak which leaf a `store` touched through the
//! backend's write trace; routing every node through a [`PlainWoram`] closes
//! that gap the same way every other layer in this crate does, just one
//! level down.

use crate::bytenum::{bytelen, getnum, storenum};
use crate::error::{Result, WoramError};
use crate::memory::Address;
use crate::position_map::{LocalPosMap, PositionMap};

use super::PlainWoram;

fn shared_prefix_len(a: &[usize], b: &[usize]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// The non-degenerate case: a real `K`-ary tree of internal nodes, stored in
/// `NW` and addressed through a private [`LocalPosMap`] exactly as any other
/// `PlainWoram` would be. The root is the one node kept in RAM.
pub struct TrieNodePM<NW> {
    node_backend: NW,
    node_posmap: LocalPosMap,
    size: usize,
    pmax: usize,
    k: usize,
    h: usize,
    numnodes: usize,
    ptrwidth: usize,
    nptr_val: usize,
    root: Vec<usize>,
    write_index: Option<usize>,
    write_path: Vec<Vec<usize>>,
    read_index: Option<usize>,
    read_path: Vec<Vec<usize>>,
    rcsplit: usize,
}

impl<NW: PlainWoram> TrieNodePM<NW> {
    /// Builds a trie of branching factor `k` over `size` logical indices,
    /// whose leaves hold positions in `[0, pmax]`, storing internal nodes on
    /// `node_backend`. `h = ceil(log_k(size))` must be at least 2 — use
    /// [`TriePositionMap::new`] for the degenerate `size <= k` case, which
    /// this type does not handle on its own.
    fn new(node_backend: NW, k: usize, size: usize, pmax: usize) -> Self {
        assert!(k >= 2, "trie branching factor must be at least 2");
        let h = height(k, size);
        assert!(h >= 2, "TrieNodePM requires size > k; use TriePositionMap for the degenerate case");
        // Nodes only exist for depths 1..=h-1: the deepest of those holds
        // leaf positions directly in its k child slots (selected by the
        // last of the h digits), rather than a further node level at depth h.
        let numnodes = level_offset(k, h);
        let ptrwidth = bytelen((numnodes.max(pmax + 1)) as u64).max(1);
        assert_eq!(
            node_backend.blocksize(),
            k * ptrwidth,
            "trie node backend blocksize must hold k={k} pointers of {ptrwidth} bytes each"
        );
        assert!(
            node_backend.size() >= numnodes,
            "trie node backend has only {} slots, need {numnodes}",
            node_backend.size()
        );
        let node_posmap = LocalPosMap::new(numnodes, node_backend.pmax());
        let nptr_val = pmax + 1;

        let mut trie = Self {
            node_backend,
            node_posmap,
            size,
            pmax,
            k,
            h,
            numnodes,
            ptrwidth,
            nptr_val,
            root: vec![0; k],
            write_index: None,
            write_path: Vec::new(),
            read_index: None,
            read_path: Vec::new(),
            rcsplit: 0,
        };
        trie.init_structure();
        trie
    }

    /// The depth of the deepest stored node level — the one whose `k` child
    /// slots hold leaf positions directly, selected by the last of the `h`
    /// digits rather than by descending into a further node.
    fn leaf_depth(&self) -> usize {
        self.h - 1
    }

    /// Primes every internal pointer (root and stored nodes) with its
    /// arithmetic child address, and every leaf-parent slot with `nptr`.
    /// Internal pointers never change after this — only the leaf-parent
    /// level's content ever does — but they are still real reads/writes on
    /// every access, so the backend trace never distinguishes levels by
    /// whether their content happens to differ.
    fn init_structure(&mut self) {
        let leaf_depth = self.leaf_depth();
        for (c, slot) in self.root.iter_mut().enumerate() {
            *slot = if leaf_depth == 0 { self.nptr_val } else { level_offset(self.k, 1) + c };
        }
        for depth in 1..=leaf_depth {
            let levelsize = self.k.pow(depth as u32);
            let offset = level_offset(self.k, depth);
            for local in 0..levelsize {
                let addr = offset + local;
                let ptrs: Vec<usize> = (0..self.k)
                    .map(|c| {
                        if depth == leaf_depth {
                            self.nptr_val
                        } else {
                            level_offset(self.k, depth + 1) + local * self.k + c
                        }
                    })
                    .collect();
                self.node_store_raw(addr, &ptrs)
                    .expect("priming a fresh trie node store cannot fail");
            }
        }
    }

    fn digits_of(&self, index: usize) -> Vec<usize> {
        let mut digits = vec![0usize; self.h];
        let mut rem = index;
        for d in (0..self.h).rev() {
            digits[d] = rem % self.k;
            rem /= self.k;
        }
        digits
    }

    fn node_addr(&self, depth: usize, digits: &[usize]) -> usize {
        let offset = level_offset(self.k, depth);
        let mut local = 0usize;
        for &c in &digits[..depth] {
            local = local * self.k + c;
        }
        offset + local
    }

    fn decode_node(&self, buf: &[u8]) -> Vec<usize> {
        (0..self.k)
            .map(|slot| getnum(&buf[slot * self.ptrwidth..(slot + 1) * self.ptrwidth]) as usize)
            .collect()
    }

    fn encode_node(&self, ptrs: &[usize]) -> Vec<u8> {
        let mut buf = vec![0u8; self.k * self.ptrwidth];
        for (slot, &p) in ptrs.iter().enumerate() {
            storenum(&mut buf[slot * self.ptrwidth..(slot + 1) * self.ptrwidth], p as u64);
        }
        buf
    }

    fn node_load_raw(&mut self, addr: usize) -> Result<Vec<usize>> {
        let pos = self.node_posmap.load(addr)?;
        let pos = if pos == self.node_posmap.nptr() { self.node_backend.nptr() } else { pos };
        let mut buf = vec![0u8; self.node_backend.blocksize()];
        self.node_backend.load(addr, pos, &mut buf)?;
        Ok(self.decode_node(&buf))
    }

    fn node_store_raw(&mut self, addr: usize, ptrs: &[usize]) -> Result<()> {
        let buf = self.encode_node(ptrs);
        let pos = self.node_backend.store(addr, &buf, &mut self.node_posmap)?;
        self.node_posmap.store(addr, pos)
    }

    fn node_dummy_write(&mut self) -> Result<()> {
        self.node_backend.dummy_write(&mut self.node_posmap)
    }

    /// Fetches the full root-to-leaf-parent path for `digits`, reusing
    /// whichever of the write/read caches shares the longer prefix, and
    /// leaves it recorded as the new read cache.
    fn fetch_path(&mut self, index: usize, digits: &[usize]) -> Result<Vec<Vec<usize>>> {
        if self.write_index == Some(index) {
            return Ok(self.write_path.clone());
        }
        if self.read_index == Some(index) {
            return Ok(self.read_path.clone());
        }

        let write_prefix = self
            .write_index
            .map(|wi| shared_prefix_len(&self.digits_of(wi), digits))
            .unwrap_or(0);
        let read_prefix = self
            .read_index
            .map(|ri| shared_prefix_len(&self.digits_of(ri), digits))
            .unwrap_or(0);

        let leaf_depth = self.leaf_depth();
        let mut path = Vec::with_capacity(leaf_depth);
        let reuse_from_write = write_prefix >= read_prefix;
        let reuse_len = write_prefix.max(read_prefix);
        for d in 0..reuse_len {
            if reuse_from_write {
                path.push(self.write_path[d].clone());
            } else {
                path.push(self.read_path[d].clone());
            }
        }
        for depth in (reuse_len + 1)..=leaf_depth {
            let addr = self.node_addr(depth, digits);
            path.push(self.node_load_raw(addr)?);
        }

        self.rcsplit = write_prefix;
        self.read_index = Some(index);
        self.read_path = path.clone();
        Ok(path)
    }
}

/// Height `h = ceil(log_k(n))`, with a floor of 1.
fn height(k: usize, n: usize) -> usize {
    let mut h = 1;
    let mut cap = k as u128;
    while cap < n as u128 {
        h += 1;
        cap *= k as u128;
    }
    h
}

/// Total node count across levels `1..depth` (exclusive), i.e. the backend
/// address of the first node at `depth`: `k + k^2 + ... + k^(depth-1)`.
fn level_offset(k: usize, depth: usize) -> usize {
    let mut offset = 0u128;
    let mut levelsize = 1u128;
    for _ in 1..depth {
        levelsize *= k as u128;
        offset += levelsize;
    }
    offset as usize
}

/// A [`PositionMap`] backed by a `K`-ary pointer trie, or — when `size` is
/// small enough that the whole thing fits in the root — just the root.
pub enum TriePositionMap<NW> {
    /// `size <= k`: the root's `k` slots directly hold the leaf positions,
    /// no node storage needed at all.
    RootOnly { size: usize, pmax: usize, root: Vec<usize> },
    /// `size > k`: a real tree, per [`TrieNodePM`].
    WithStore(TrieNodePM<NW>),
}

impl<NW: PlainWoram> TriePositionMap<NW> {
    /// Builds a position map of branching factor `k` over `size` logical
    /// indices with positions in `[0, pmax]`. Takes ownership of
    /// `node_backend` (ignored, and may be zero-sized, in the degenerate
    /// `size <= k` case).
    pub fn new(node_backend: NW, k: usize, size: usize, pmax: usize) -> Self {
        assert!(k >= 2, "trie branching factor must be at least 2");
        if size <= k {
            Self::RootOnly { size, pmax, root: vec![pmax + 1; k] }
        } else {
            Self::WithStore(TrieNodePM::new(node_backend, k, size, pmax))
        }
    }

    /// The branching factor's count of internal nodes off the root; `0` in
    /// the degenerate case.
    pub fn numnodes(&self) -> usize {
        match self {
            Self::RootOnly { .. } => 0,
            Self::WithStore(t) => t.numnodes,
        }
    }
}

impl<NW: PlainWoram> PositionMap for TriePositionMap<NW> {
    fn size(&self) -> usize {
        match self {
            Self::RootOnly { size, .. } => *size,
            Self::WithStore(t) => t.size,
        }
    }

    fn pmax(&self) -> usize {
        match self {
            Self::RootOnly { pmax, .. } => *pmax,
            Self::WithStore(t) => t.pmax,
        }
    }

    fn load(&mut self, index: Address) -> Result<usize> {
        WoramError::check_range(index, self.size().saturating_sub(1))?;
        match self {
            Self::RootOnly { root, .. } => Ok(root[index]),
            Self::WithStore(t) => {
                let digits = t.digits_of(index);
                let path = t.fetch_path(index, &digits)?;
                let leaf_depth = t.leaf_depth();
                Ok(path[leaf_depth - 1][digits[t.h - 1]])
            }
        }
    }

    fn store(&mut self, index: Address, pos: usize) -> Result<()> {
        WoramError::check_range(index, self.size().saturating_sub(1))?;
        WoramError::check_range(pos, self.pmax())?;
        match self {
            Self::RootOnly { root, .. } => {
                root[index] = pos;
                Ok(())
            }
            Self::WithStore(t) => {
                let digits = t.digits_of(index);
                let leaf_depth = t.leaf_depth();
                let mut path = t.fetch_path(index, &digits)?;
                path[leaf_depth - 1][digits[t.h - 1]] = pos;

                let leaf_addr = t.node_addr(leaf_depth, &digits);
                t.node_store_raw(leaf_addr, &path[leaf_depth - 1])?;
                for _ in 1..leaf_depth {
                    t.node_dummy_write()?;
                }

                t.write_index = Some(index);
                t.write_path = path;
                t.read_index = None;
                t.rcsplit = 1;
                Ok(())
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self {
            Self::RootOnly { .. } => Ok(()),
            Self::WithStore(t) => {
                t.node_backend.flush()?;
                t.node_posmap.flush()
            }
        }
    }
}
