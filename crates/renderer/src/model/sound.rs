//! Lip-sync audio fetched off the frame thread.
//!
//! Fetch and decode run on a worker; the runtime polls the result at the
//! start of each frame and only then starts playback.

use std::thread;

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use lipsync::{AudioClip, LipSyncError};
use modelpack::ResourceFetcher;

pub(crate) struct PendingSound {
    uri: String,
    receiver: Receiver<Result<AudioClip, LipSyncError>>,
}

pub(crate) enum SoundPoll {
    Waiting,
    Ready(Result<AudioClip, LipSyncError>),
    /// The worker ended without sending, e.g. it panicked while decoding.
    Lost,
}

impl PendingSound {
    pub(crate) fn spawn(fetcher: ResourceFetcher, uri: String) -> Result<Self, LipSyncError> {
        let (tx, rx) = bounded(1);
        let worker_uri = uri.clone();
        thread::Builder::new()
            .name("lip-sync-fetch".into())
            .spawn(move || {
                let result = AudioClip::fetch(&fetcher, &worker_uri);
                // The receiver is gone when a newer sound replaced this one.
                let _ = tx.send(result);
            })
            .map_err(LipSyncError::Worker)?;
        Ok(Self { uri, receiver: rx })
    }

    pub(crate) fn uri(&self) -> &str {
        &self.uri
    }

    pub(crate) fn poll(&self) -> SoundPoll {
        match self.receiver.try_recv() {
            Ok(result) => SoundPoll::Ready(result),
            Err(TryRecvError::Empty) => SoundPoll::Waiting,
            Err(TryRecvError::Disconnected) => SoundPoll::Lost,
        }
    }
}
