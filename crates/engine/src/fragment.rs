//! Per-interface fragment reassembly for multi-fragment `VariableSet`
//! writes, plus the producer-side fragmentation plan shared by every
//! outbound message kind that can exceed an interface's `max_payload`.

/// Per-interface reassembly scratch state. An interface has at most one
/// in-flight reassembly at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyState {
    Idle,
    Collecting {
        struct_id: u16,
        struct_offset: u16,
        expected_fragments: u8,
        next_fragment: u8,
        buf: Vec<u8>,
    },
}

impl Default for ReassemblyState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Result of feeding one `VariableSet` frame into [`step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// Single-fragment write: apply immediately, no reassembly involved.
    Immediate { struct_id: u16, struct_offset: u16, data: Vec<u8> },
    /// Accepted into an in-flight reassembly; more fragments expected.
    Pending,
    /// Final fragment accepted; the reassembled payload is ready to commit.
    Complete { struct_id: u16, struct_offset: u16, data: Vec<u8> },
    /// Out-of-sequence fragment: any in-flight buffer and this frame are both discarded.
    Reset,
}

/// Feeds one `VariableSet` fragment through the reassembly state machine,
/// following the producer/consumer contract exactly: `fragment_number==0`
/// always (re)starts a reassembly (discarding any in-flight one), frames
/// must arrive in strict ascending order, and the final fragment commits.
pub fn step(
    state: &mut ReassemblyState,
    fragment_number: u8,
    total_fragments: u8,
    struct_id: u16,
    struct_offset: u16,
    variable_size: u16,
    data: &[u8],
) -> FragmentOutcome {
    if total_fragments <= 1 {
        *state = ReassemblyState::Idle;
        return FragmentOutcome::Immediate {
            struct_id,
            struct_offset,
            data: data.to_vec(),
        };
    }

    if fragment_number == 0 {
        let mut buf = Vec::with_capacity(variable_size as usize);
        buf.extend_from_slice(data);
        *state = ReassemblyState::Collecting {
            struct_id,
            struct_offset,
            expected_fragments: total_fragments,
            next_fragment: 1,
            buf,
        };
        return FragmentOutcome::Pending;
    }

    match state {
        ReassemblyState::Idle => FragmentOutcome::Reset,
        ReassemblyState::Collecting {
            struct_id: sid,
            struct_offset: soff,
            expected_fragments,
            next_fragment,
            buf,
        } => {
            if fragment_number != *next_fragment || fragment_number >= *expected_fragments {
                *state = ReassemblyState::Idle;
                return FragmentOutcome::Reset;
            }
            buf.extend_from_slice(data);
            if fragment_number == *expected_fragments - 1 {
                let complete = std::mem::take(buf);
                let outcome = FragmentOutcome::Complete {
                    struct_id: *sid,
                    struct_offset: *soff,
                    data: complete,
                };
                *state = ReassemblyState::Idle;
                outcome
            } else {
                *next_fragment += 1;
                FragmentOutcome::Pending
            }
        }
    }
}

/// One slice of a producer-side fragmentation plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentSlice {
    pub total_fragments: u8,
    pub fragment_number: u8,
    pub offset: usize,
    pub len: usize,
}

/// Splits a logical payload of `data_len` bytes into frames no larger
/// than `max_payload - header_size` each, emitted contiguously.
pub fn fragment_plan(header_size: usize, max_payload: usize, data_len: usize) -> Vec<FragmentSlice> {
    let per_frag = max_payload.saturating_sub(header_size).max(1);
    let total_fragments = data_len.div_ceil(per_frag).max(1);
    let total_fragments_u8 = total_fragments.min(u8::MAX as usize) as u8;
    (0..total_fragments)
        .map(|f| {
            let off = f * per_frag;
            let cur = per_frag.min(data_len - off);
            FragmentSlice {
                total_fragments: total_fragments_u8,
                fragment_number: f as u8,
                offset: off,
                len: cur,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_fragment_applies_immediately() {
        let mut state = ReassemblyState::Idle;
        let outcome = step(&mut state, 0, 1, 1, 0, 4, &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(
            outcome,
            FragmentOutcome::Immediate {
                struct_id: 1,
                struct_offset: 0,
                data: vec![0xDE, 0xAD, 0xBE, 0xEF]
            }
        );
        assert_eq!(state, ReassemblyState::Idle);
    }

    #[test]
    fn multi_fragment_reassembles_in_order() {
        let mut state = ReassemblyState::Idle;
        let full: Vec<u8> = (0..200u32).map(|i| (i % 256) as u8).collect();
        let plan = fragment_plan(11, 50, 200);
        assert_eq!(plan.len(), (200f64 / 39f64).ceil() as usize);
        let mut last = FragmentOutcome::Pending;
        for slice in &plan {
            last = step(
                &mut state,
                slice.fragment_number,
                slice.total_fragments,
                7,
                0,
                200,
                &full[slice.offset..slice.offset + slice.len],
            );
        }
        match last {
            FragmentOutcome::Complete { data, .. } => assert_eq!(data, full),
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn out_of_order_fragment_resets_and_discards() {
        let mut state = ReassemblyState::Idle;
        step(&mut state, 0, 3, 1, 0, 30, &[1, 2, 3]);
        let outcome = step(&mut state, 2, 3, 1, 0, 30, &[7, 8, 9]);
        assert_eq!(outcome, FragmentOutcome::Reset);
        assert_eq!(state, ReassemblyState::Idle);
    }

    #[test]
    fn new_fragment_zero_discards_in_flight_reassembly() {
        let mut state = ReassemblyState::Idle;
        step(&mut state, 0, 3, 1, 0, 30, &[1, 2, 3]);
        let outcome = step(&mut state, 0, 2, 1, 0, 10, &[9, 9]);
        assert_eq!(outcome, FragmentOutcome::Pending);
        match &state {
            ReassemblyState::Collecting { buf, .. } => assert_eq!(buf, &vec![9, 9]),
            ReassemblyState::Idle => panic!("expected Collecting"),
        }
    }

    #[test]
    fn fragment_plan_covers_whole_payload_with_no_overlap() {
        let plan = fragment_plan(10, 30, 55);
        let total: usize = plan.iter().map(|s| s.len).sum();
        assert_eq!(total, 55);
        for (i, slice) in plan.iter().enumerate() {
            assert_eq!(slice.fragment_number as usize, i);
            assert_eq!(slice.total_fragments as usize, plan.len());
        }
    }
}
