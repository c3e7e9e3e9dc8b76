//! Single-slot, latest-wins hand-off of finished frames from the capture thread to the render thread.
//!
//! The slot never queues: publishing while a frame is still pending replaces it, so the renderer always
//! sees the newest frame and a slow renderer just makes the capture side drop frames.
//!
//! Storage is recycled. The receiver swaps its previous front buffer into the slot when it takes a frame,
//! so after a couple of frames both buffers are sized and nothing is allocated until the frame size changes.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::frame::{FrameSize, PixelBuffer, rgba_len};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct MailboxStats {
    pub published: u64,
    pub taken: u64,
    /// Frames replaced by a newer one before the receiver got to them.
    pub overwritten: u64,
    /// How many times the slot storage had to be (re)allocated.
    pub allocations: u64,
}

#[derive(Default)]
struct Slot {
    frame: PixelBuffer,
    pending: bool,
    stats: MailboxStats,
}

/// Writing half of the mailbox. Lives on the capture thread.
pub struct FramePublisher {
    slot: Arc<Mutex<Slot>>,
}

/// Reading half of the mailbox. Lives on the render thread.
pub struct FrameReceiver {
    slot: Arc<Mutex<Slot>>,
    front: PixelBuffer,
}

pub fn frame_mailbox() -> (FramePublisher, FrameReceiver) {
    let slot = Arc::new(Mutex::new(Slot::default()));
    (
        FramePublisher { slot: slot.clone() },
        FrameReceiver {
            slot,
            front: PixelBuffer::default(),
        },
    )
}

impl FramePublisher {
    /// Copies `pixels` into the slot, replacing any frame that wasn't taken yet.
    ///
    /// # Panics
    ///
    /// If `pixels` is not exactly `width * height * 4` bytes.
    pub fn publish(&self, pixels: &[u8], size: FrameSize) {
        assert_eq!(
            pixels.len(),
            rgba_len(size),
            "RGBA data does not match the {}x{} frame size",
            size.width,
            size.height
        );

        let mut slot = self.slot.lock();
        if slot.frame.resize(size) {
            slot.stats.allocations += 1;
        }
        slot.frame.data_mut().copy_from_slice(pixels);

        if slot.pending {
            slot.stats.overwritten += 1;
        }
        slot.pending = true;
        slot.stats.published += 1;
    }

    pub fn publish_buffer(&self, buffer: &PixelBuffer) {
        self.publish(buffer.data(), buffer.size())
    }

    pub fn stats(&self) -> MailboxStats {
        self.slot.lock().stats
    }
}

impl FrameReceiver {
    /// Returns the frame published since the last call, if any.
    ///
    /// Each published frame is returned at most once.
    pub fn take_if_available(&mut self) -> Option<&PixelBuffer> {
        {
            let mut slot = self.slot.lock();
            if !slot.pending {
                return None;
            }
            std::mem::swap(&mut slot.frame, &mut self.front);
            slot.pending = false;
            slot.stats.taken += 1;
        }

        Some(&self.front)
    }

    pub fn stats(&self) -> MailboxStats {
        self.slot.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, fill: u8) -> PixelBuffer {
        PixelBuffer::filled(FrameSize::new(width, height), [fill; 4])
    }

    #[test]
    fn test_latest_wins() {
        let (publisher, mut receiver) = frame_mailbox();

        publisher.publish_buffer(&frame(2, 2, 0xA));
        publisher.publish_buffer(&frame(2, 2, 0xB));

        let taken = receiver.take_if_available().unwrap();
        assert_eq!(taken, &frame(2, 2, 0xB));

        assert!(receiver.take_if_available().is_none());

        let stats = receiver.stats();
        assert_eq!(stats.published, 2);
        assert_eq!(stats.taken, 1);
        assert_eq!(stats.overwritten, 1);
    }

    #[test]
    fn test_empty_mailbox() {
        let (_publisher, mut receiver) = frame_mailbox();
        assert!(receiver.take_if_available().is_none());
    }

    #[test]
    fn test_same_size_publishes_reuse_storage() {
        let (publisher, mut receiver) = frame_mailbox();

        publisher.publish_buffer(&frame(4, 4, 1));
        publisher.publish_buffer(&frame(4, 4, 2));
        assert_eq!(publisher.stats().allocations, 1);

        // the receiver starts with an empty front buffer, the first swap hands that to the slot
        receiver.take_if_available().unwrap();
        publisher.publish_buffer(&frame(4, 4, 3));
        receiver.take_if_available().unwrap();
        let warmed_up = publisher.stats().allocations;

        for fill in 0..10 {
            publisher.publish_buffer(&frame(4, 4, fill));
            assert_eq!(receiver.take_if_available().unwrap(), &frame(4, 4, fill));
        }
        assert_eq!(publisher.stats().allocations, warmed_up);
    }

    #[test]
    fn test_size_change_reallocates() {
        let (publisher, mut receiver) = frame_mailbox();

        publisher.publish_buffer(&frame(4, 4, 1));
        publisher.publish_buffer(&frame(8, 2, 2));
        assert_eq!(publisher.stats().allocations, 2);

        let taken = receiver.take_if_available().unwrap();
        assert_eq!(taken.size(), FrameSize::new(8, 2));
    }

    #[test]
    #[should_panic]
    fn test_wrong_length_panics() {
        let (publisher, _receiver) = frame_mailbox();
        publisher.publish(&[0; 15], FrameSize::new(2, 2));
    }

    #[test]
    fn test_cross_thread_hand_off() {
        let (publisher, mut receiver) = frame_mailbox();

        let producer = std::thread::spawn(move || {
            for fill in 0..=200u8 {
                publisher.publish_buffer(&frame(2, 2, fill));
            }
        });

        let mut last_seen = None;
        loop {
            let finished = producer.is_finished();
            if let Some(taken) = receiver.take_if_available() {
                let fill = taken.data()[0];
                // frames arrive in order, with gaps but without repeats
                assert!(last_seen.is_none_or(|last| fill > last));
                assert!(taken.data().iter().all(|&b| b == fill));
                last_seen = Some(fill);
            }
            let stats = receiver.stats();
            if finished && stats.published == stats.taken + stats.overwritten {
                break;
            }
        }
        producer.join().unwrap();

        assert_eq!(last_seen, Some(200));
    }
}
