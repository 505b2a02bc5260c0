//! Async adapter driving the synchronous detector over a chunk stream.

use std::{
    pin::Pin,
    task::{
        Context,
        Poll,
        ready,
    },
};

use futures_util::Stream;
use pin_project_lite::pin_project;

use crate::{
    detect::{
        PackageKind,
        PulseDetector,
    },
    fsk::FskMode,
    level::LevelConfig,
    train::PulseTrain,
};

/// Matched envelope and instantaneous-frequency samples covering the same
/// span of the capture.
#[derive(Clone, Debug, Default)]
pub struct SampleChunk {
    pub envelope: Vec<i16>,
    pub fm: Vec<i16>,
}

/// A completed package together with the buffer it was assembled in.
#[derive(Clone, Debug)]
pub enum DetectedPackage {
    Ook(PulseTrain),
    Fsk(PulseTrain),
}

impl DetectedPackage {
    pub fn kind(&self) -> PackageKind {
        match self {
            Self::Ook(_) => PackageKind::Ook,
            Self::Fsk(_) => PackageKind::Fsk,
        }
    }

    pub fn train(&self) -> &PulseTrain {
        match self {
            Self::Ook(train) => train,
            Self::Fsk(train) => train,
        }
    }
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("pulse detect stream error")]
pub enum DetectError<S> {
    Stream(S),
    ChunkMismatch { envelope: usize, fm: usize },
}

pin_project! {
    /// Yields one [`DetectedPackage`] per completed package in the
    /// incoming chunk stream.
    #[derive(Debug)]
    pub struct DetectStream<T> {
        #[pin]
        chunks: T,
        detector: PulseDetector,
        fsk_mode: FskMode,
        sample_rate: u32,
        offset: u64,
        current: Option<SampleChunk>,
        ook: Box<PulseTrain>,
        fsk: Box<PulseTrain>,
    }
}

impl<T> DetectStream<T> {
    pub fn new(chunks: T, config: LevelConfig, fsk_mode: FskMode, sample_rate: u32) -> Self {
        Self {
            chunks,
            detector: PulseDetector::new(config),
            fsk_mode,
            sample_rate,
            offset: 0,
            current: None,
            ook: Box::default(),
            fsk: Box::default(),
        }
    }
}

impl<T, E> Stream for DetectStream<T>
where
    T: Stream<Item = Result<SampleChunk, E>>,
{
    type Item = Result<DetectedPackage, DetectError<E>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let this = self.as_mut().project();

            if let Some(chunk) = this.current {
                // drain the current chunk before pulling the next one;
                // the detector keeps its position inside the chunk
                // across calls
                match this.detector.detect(
                    &chunk.envelope,
                    &chunk.fm,
                    *this.sample_rate,
                    *this.offset,
                    *this.fsk_mode,
                    this.ook,
                    this.fsk,
                ) {
                    Some(PackageKind::Ook) => {
                        return Poll::Ready(Some(Ok(DetectedPackage::Ook((**this.ook).clone()))));
                    }
                    Some(PackageKind::Fsk) => {
                        return Poll::Ready(Some(Ok(DetectedPackage::Fsk((**this.fsk).clone()))));
                    }
                    None => {
                        *this.offset += chunk.envelope.len() as u64;
                        *this.current = None;
                    }
                }
            }
            else {
                match ready!(this.chunks.poll_next(cx)) {
                    None => return Poll::Ready(None),
                    Some(Err(error)) => {
                        return Poll::Ready(Some(Err(DetectError::Stream(error))));
                    }
                    Some(Ok(chunk)) => {
                        if chunk.envelope.len() != chunk.fm.len() {
                            return Poll::Ready(Some(Err(DetectError::ChunkMismatch {
                                envelope: chunk.envelope.len(),
                                fm: chunk.fm.len(),
                            })));
                        }
                        *this.current = Some(chunk);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use futures_util::{
        FutureExt,
        StreamExt,
        stream,
    };

    use super::{
        DetectError,
        DetectStream,
        DetectedPackage,
        SampleChunk,
    };
    use crate::{
        detect::PackageKind,
        fsk::FskMode,
        level::LevelConfig,
    };

    fn chunked(envelope: Vec<i16>, chunk_len: usize) -> Vec<Result<SampleChunk, Infallible>> {
        envelope
            .chunks(chunk_len)
            .map(|chunk| {
                Ok(SampleChunk {
                    envelope: chunk.to_vec(),
                    fm: vec![0; chunk.len()],
                })
            })
            .collect()
    }

    #[test]
    fn stream_yields_packages() {
        let mut envelope = vec![40i16; 1200];
        envelope.extend([2000i16; 40]);
        envelope.extend([40i16; 3000]);

        let mut detect = DetectStream::new(
            stream::iter(chunked(envelope, 512)),
            LevelConfig::default(),
            FskMode::MinMax,
            250_000,
        );

        let package = detect
            .next()
            .now_or_never()
            .expect("stream returned pending")
            .expect("stream ended without a package")
            .expect("stream returned an error");
        assert_eq!(package.kind(), PackageKind::Ook);
        assert_eq!(package.train().pulses(), &[40]);
        assert_eq!(package.train().offset(), 1200);

        let next = detect.next().now_or_never().expect("stream returned pending");
        assert!(next.is_none());
    }

    #[test]
    fn mismatched_chunk_is_an_error() {
        let chunks = vec![Ok::<_, Infallible>(SampleChunk {
            envelope: vec![0; 128],
            fm: vec![0; 64],
        })];
        let mut detect = DetectStream::new(
            stream::iter(chunks),
            LevelConfig::default(),
            FskMode::MinMax,
            250_000,
        );

        let result = detect
            .next()
            .now_or_never()
            .expect("stream returned pending")
            .expect("stream ended early");
        match result {
            Err(DetectError::ChunkMismatch { envelope, fm }) => {
                assert_eq!(envelope, 128);
                assert_eq!(fm, 64);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn fsk_packages_come_out_of_the_second_buffer() {
        let mut envelope = vec![40i16; 1200];
        let mut fm = vec![0i16; 1200];
        for _ in 0..20 {
            envelope.extend([2000i16; 90]);
            fm.extend([4000i16; 50]);
            fm.extend([-4000i16; 40]);
        }
        envelope.extend([40i16; 3000]);
        fm.extend([0i16; 3000]);

        let chunks: Vec<Result<SampleChunk, Infallible>> = envelope
            .chunks(1000)
            .zip(fm.chunks(1000))
            .map(|(envelope, fm)| {
                Ok(SampleChunk {
                    envelope: envelope.to_vec(),
                    fm: fm.to_vec(),
                })
            })
            .collect();

        let mut detect = DetectStream::new(
            stream::iter(chunks),
            LevelConfig::default(),
            FskMode::Classic,
            250_000,
        );

        let package = detect
            .next()
            .now_or_never()
            .expect("stream returned pending")
            .expect("stream ended without a package")
            .expect("stream returned an error");
        match package {
            DetectedPackage::Fsk(train) => {
                assert!(train.num_pulses() > 16);
            }
            DetectedPackage::Ook(train) => panic!("expected fsk package, got ook: {train:?}"),
        }
    }
}
