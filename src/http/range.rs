//! Parsing of the `Range: bytes=...` request header.
//!
//! [`parse_range`] is a pure function over its arguments: no I/O, no shared
//! state, and no coalescing of overlapping or out-of-order specs. Ranges are
//! returned in the order they were requested, duplicates and all, because a
//! multi-range response must mirror what the client asked for.

/// A half-open byte interval `[offset, offset + length)` into a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub offset: u64,
    pub length: u64,
}

impl Range {
    pub fn end_inclusive(self) -> u64 {
        self.offset + self.length - 1
    }
}

/// Parses a `Range` header value against a resource of `len` bytes.
///
/// Returns `None` if the header doesn't start with `bytes=` (the header
/// should then be ignored entirely, per RFC 7233). Returns `Some(vec![])`
/// if every spec in the header was unsatisfiable, which the caller should
/// treat as a `416`. Otherwise returns the satisfiable specs in the order
/// they appeared, un-sorted and un-merged.
pub fn parse_range(header: &str, len: u64) -> Option<Vec<Range>> {
    let specs = header.strip_prefix("bytes=")?;

    let mut ranges = Vec::new();
    for spec in specs.split(',') {
        let spec = spec.trim();
        if spec.is_empty() {
            continue;
        }
        if let Some(range) = parse_spec(spec, len) {
            ranges.push(range);
        }
    }

    Some(ranges)
}

fn parse_spec(spec: &str, len: u64) -> Option<Range> {
    let (a, b) = spec.split_once('-')?;

    if a.is_empty() {
        // Suffix form: "-N" — the last N bytes.
        let n: u64 = b.parse().ok()?;
        if n == 0 || len == 0 {
            return None;
        }
        let n = n.min(len);
        return Some(Range {
            offset: len - n,
            length: n,
        });
    }

    let a: u64 = a.parse().ok()?;
    if a >= len {
        return None;
    }

    if b.is_empty() {
        // Open form: "M-" — from M to the end.
        return Some(Range {
            offset: a,
            length: len - a,
        });
    }

    let mut b: u64 = b.parse().ok()?;
    if a > b {
        return None;
    }
    if b >= len {
        b = len - 1;
    }
    Some(Range {
        offset: a,
        length: b - a + 1,
    })
}
