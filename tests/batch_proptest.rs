//! Property-based tests for command batch reservations.
//!
//! Uses `proptest` to generate random reservation sequences and check that
//! the regions handed out tile both streams exactly.

use ftdi_i2c::{mpsse, CommandBatch, CommandHandle, Error};
use proptest::prelude::*;

/// (command bytes, response bytes) pairs, including empty reservations.
fn reservations() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0usize..64, 0usize..16), 0..64)
}

fn reserve_all(batch: &mut CommandBatch, sizes: &[(usize, usize)]) -> Vec<CommandHandle> {
    sizes
        .iter()
        .map(|&(cmd, resp)| batch.reserve(cmd, resp).unwrap())
        .collect()
}

proptest! {
    /// Reservation lengths sum to the stream lengths.
    #[test]
    fn lengths_sum_to_stream_lengths(sizes in reservations()) {
        let mut batch = CommandBatch::new();
        let handles = reserve_all(&mut batch, &sizes);

        let cmd_total: usize = handles.iter().map(|h| h.command_len()).sum();
        let resp_total: usize = handles.iter().map(|h| h.response_len()).sum();
        prop_assert_eq!(cmd_total, batch.command_len());
        prop_assert_eq!(resp_total, batch.response_len());
    }

    /// Handles never overlap and appear in reservation order.
    #[test]
    fn regions_are_disjoint_and_ordered(sizes in reservations()) {
        let mut batch = CommandBatch::new();
        let handles = reserve_all(&mut batch, &sizes);

        let mut cmd_end = 0;
        let mut resp_end = 0;
        for h in &handles {
            prop_assert_eq!(h.command_offset(), cmd_end);
            prop_assert_eq!(h.response_offset(), resp_end);
            cmd_end += h.command_len();
            resp_end += h.response_len();
        }
    }

    /// Writing through one handle never changes another handle's bytes.
    #[test]
    fn command_writes_stay_in_their_region(sizes in reservations()) {
        let mut batch = CommandBatch::new();
        let handles = reserve_all(&mut batch, &sizes);

        for (i, h) in handles.iter().enumerate() {
            batch.command_mut(h).unwrap().fill(i as u8);
        }
        for (i, h) in handles.iter().enumerate() {
            prop_assert!(batch.command(h).unwrap().iter().all(|&b| b == i as u8));
        }
    }

    /// After a reset the next reservation starts at offset zero and every
    /// earlier handle is rejected.
    #[test]
    fn reset_invalidates_handles(sizes in reservations(), next in (0usize..64, 0usize..16)) {
        let mut batch = CommandBatch::new();
        let old = reserve_all(&mut batch, &sizes);
        batch.reset();

        let h = batch.reserve(next.0, next.1).unwrap();
        prop_assert_eq!(h.command_offset(), 0);
        prop_assert_eq!(h.response_offset(), 0);
        for stale in &old {
            prop_assert!(matches!(batch.command(stale), Err(Error::StaleHandle)));
        }
    }

    /// Encoded byte writes carry their payload verbatim behind the header.
    #[test]
    fn write_bytes_payload_is_verbatim(data in prop::collection::vec(any::<u8>(), 1..512)) {
        let mut batch = CommandBatch::new();
        let h = mpsse::write_bytes(&mut batch, &data).unwrap();
        let cmd = batch.command(&h).unwrap();

        prop_assert_eq!(cmd[0], 0x11);
        prop_assert_eq!(u16::from_le_bytes([cmd[1], cmd[2]]) as usize, data.len() - 1);
        prop_assert_eq!(&cmd[3..], data.as_slice());
    }
}
