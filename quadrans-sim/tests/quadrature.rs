//! Property tests over generated quadrature walks.
//!
//! For any sequence of forward/backward quarter-cycle steps with valid
//! quadrature ordering, the position counter tracks the walk one count per
//! edge, the direction readback follows the last step, and the counter sits
//! on a multiple of four whenever the pins return to the reference state.

use proptest::prelude::*;
use quadrans_core::{ChannelId, Priority, QdConfig};
use quadrans_sim::{Coprocessor, RotationDirection};

const PHASE_A: u8 = 1;
const PHASE_B: u8 = 2;

/// Pin levels per quadrature phase position, reference state first.
const PIN_TABLE: [(bool, bool); 4] = [
    (false, false),
    (true, false),
    (true, true),
    (false, true),
];

fn chan(raw: u8) -> ChannelId {
    ChannelId::new(raw).unwrap()
}

proptest! {
    #[test]
    fn prop_position_tracks_any_walk(steps in proptest::collection::vec(any::<bool>(), 1..200)) {
        let mut cop = Coprocessor::new();
        // all-zero thresholds pin the decoder to slow mode, so arbitrary
        // step timing cannot trip windowing
        let handle = cop.qd_init(&QdConfig::new(PHASE_A, PHASE_B), Priority::Middle).unwrap();

        let mut position: i64 = 0;
        let mut phase: i64 = 0;
        for forward in steps {
            let previous = PIN_TABLE[phase.rem_euclid(4) as usize];
            phase += if forward { 1 } else { -1 };
            position += if forward { 1 } else { -1 };
            let next = PIN_TABLE[phase.rem_euclid(4) as usize];

            cop.advance(2_000).unwrap();
            if previous.0 != next.0 {
                cop.write_pin(chan(PHASE_A), next.0).unwrap();
            } else {
                cop.write_pin(chan(PHASE_B), next.1).unwrap();
            }

            prop_assert_eq!(cop.qd_pc(handle) as i64, position);
            prop_assert_eq!(cop.qd_pc_sc(handle) as i64, position);
            let expected = if forward {
                RotationDirection::Increment
            } else {
                RotationDirection::Decrement
            };
            prop_assert_eq!(cop.qd_direction(handle), expected);

            // back at the reference state the count is a whole number of
            // electrical cycles
            if phase.rem_euclid(4) == 0 {
                prop_assert_eq!(position.rem_euclid(4), 0);
                prop_assert_eq!((cop.qd_pc(handle) as i64).rem_euclid(4), 0);
            }
        }
    }

    #[test]
    fn prop_walk_net_displacement(
        forward_runs in proptest::collection::vec(1usize..8, 1..20),
    ) {
        // alternate runs of forward and backward steps; the final position
        // is the signed sum
        let mut cop = Coprocessor::new();
        let handle = cop.qd_init(&QdConfig::new(PHASE_A, PHASE_B), Priority::Middle).unwrap();

        let mut position: i64 = 0;
        let mut phase: i64 = 0;
        for (run, length) in forward_runs.iter().enumerate() {
            let forward = run % 2 == 0;
            for _ in 0..*length {
                let previous = PIN_TABLE[phase.rem_euclid(4) as usize];
                phase += if forward { 1 } else { -1 };
                position += if forward { 1 } else { -1 };
                let next = PIN_TABLE[phase.rem_euclid(4) as usize];

                cop.advance(1_500).unwrap();
                if previous.0 != next.0 {
                    cop.write_pin(chan(PHASE_A), next.0).unwrap();
                } else {
                    cop.write_pin(chan(PHASE_B), next.1).unwrap();
                }
            }
        }
        prop_assert_eq!(cop.qd_pc(handle) as i64, position);
    }
}
