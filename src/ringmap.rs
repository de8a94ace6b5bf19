//! Pure functions over the ring's geometry: wrapping positions and chunk
//! indices into their canonical range, picking the shortest-arc
//! representative of a position relative to a reference, and enumerating the
//! chunk ids whose centers fall inside an arc window.
//!
//! Every function here is a pure function of its arguments plus the ring's
//! fixed geometry constants (`C`, `L`, `N`); nothing here touches shared
//! state, which is what makes it straightforward to cover exhaustively with
//! property tests.

use crate::models::ChunkId;

/// Fixed ring geometry: circumference, chunk length and the derived chunk
/// count. Constructed once from [`crate::config::Config`] and shared by
/// value (it's `Copy`) wherever geometry math is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingGeometry {
    /// Circumference, in meters. Must be positive.
    pub circumference: i64,
    /// Chunk length along the ring, in meters. Must evenly divide `circumference`.
    pub chunk_length: i64,
}

impl RingGeometry {
    pub fn new(circumference: i64, chunk_length: i64) -> Self {
        assert!(circumference > 0, "circumference must be positive");
        assert!(chunk_length > 0, "chunk_length must be positive");
        assert_eq!(
            circumference % chunk_length,
            0,
            "chunk_length must evenly divide circumference"
        );
        Self {
            circumference,
            chunk_length,
        }
    }

    /// `N`, the number of chunk indices per floor.
    pub fn chunk_count(&self) -> i64 {
        self.circumference / self.chunk_length
    }

    /// Wraps a signed arc position into `[0, C)` via floor-mod.
    pub fn wrap_position(&self, x: i64) -> i64 {
        x.rem_euclid(self.circumference)
    }

    /// Wraps a signed chunk index into `[0, N)` via floor-mod.
    pub fn validate_chunk_index(&self, i: i64) -> i64 {
        i.rem_euclid(self.chunk_count())
    }

    /// Signed distance from `b` to `a` along the ring, in `(-C/2, +C/2]`.
    ///
    /// Positive means `a` lies ahead of `b` (increasing position); negative
    /// means `a` lies behind `b`.
    pub fn shortest_delta(&self, a: i64, b: i64) -> i64 {
        let c = self.circumference;
        let half = c / 2;
        // wrap (a - b) into (-C/2, C/2]
        let raw = (a - b).rem_euclid(c);
        if raw > half {
            raw - c
        } else {
            raw
        }
    }

    /// Enumerates the chunk ids whose center (`k * L`) falls inside the
    /// closed arc window `[s - radius, s + radius]` (mod `C`), on `floor`.
    ///
    /// Ordering is ascending by absolute shortest-arc distance from `s`,
    /// with ties (equidistant behind/ahead) broken by placing the "behind"
    /// chunk first — this is the "closest first, spiralling out" order the
    /// streaming protocol relies on.
    pub fn chunks_in_window(&self, s: i64, radius: i64, floor: i32) -> Vec<ChunkId> {
        assert!(radius >= 0, "radius must be non-negative");

        let l = self.chunk_length;

        // Candidate chunk indices, in "linear" (unwrapped) space: every
        // multiple of L inside [s - radius, s + radius].
        let k_lo = div_ceil(s - radius, l);
        let k_hi = div_floor(s + radius, l);

        let mut seen = std::collections::HashSet::new();
        let mut items: Vec<(i64, i64)> = Vec::new(); // (wrapped index, signed delta)

        if k_lo <= k_hi {
            for k in k_lo..=k_hi {
                let wrapped = self.validate_chunk_index(k);
                if seen.insert(wrapped) {
                    let center = wrapped * l;
                    let delta = self.shortest_delta(center, s);
                    items.push((wrapped, delta));
                }
            }
        }

        items.sort_by_key(|&(_, delta)| (delta.unsigned_abs(), i64::from(delta > 0)));

        items
            .into_iter()
            .map(|(k, _)| ChunkId::new(floor, k as u32))
            .collect()
    }
}

/// Floor division for signed integers (Rust's `/` truncates toward zero).
fn div_floor(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if (r != 0) && ((r < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

/// Ceiling division for signed integers.
fn div_ceil(a: i64, b: i64) -> i64 {
    -div_floor(-a, b)
}
