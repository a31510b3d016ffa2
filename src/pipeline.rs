// src/pipeline.rs
//
// One worker thread renders; one presentation loop displays. A job is
// accepted only when the pipeline is idle (busy-flag compare-exchange plus a
// capacity-1 job queue); anything arriving mid-job is dropped, never queued.
// A finished buffer reaches the presentation side in two steps: first a
// PNG-encoded-then-decoded preview, then the raw bytes. The busy flag stays
// set until the presentation loop adopts the raw blit.
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, RgbImage};

use crate::color::{colorize, ColorBuffer};
use crate::config::Tuning;
use crate::noise::{self, FieldParams, NoiseField};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Recompute the field, then colorize it.
    Generate,
    /// Reuse the cached field and only re-run the color pass.
    Recolor,
}

#[derive(Debug, Clone)]
struct Job {
    kind: JobKind,
    tuning: Tuning,
}

/// Worker-to-presentation messages, drained in enqueue order. Within one job
/// `Preview` always precedes `Blit`; a failed job sends only `Failed`.
pub enum Frame {
    /// Fast path: the buffer round-tripped through a self-describing image
    /// format. May be shown immediately.
    Preview { image: RgbImage },
    /// Canonical upload: raw bytes, row-major RGB. Adopting this replaces
    /// the preview; the adopter must call [`Pipeline::mark_idle`].
    Blit {
        bytes: Vec<u8>,
        width: u32,
        height: u32,
    },
    /// The job was aborted; the previous display stays. The busy gate is
    /// already cleared when this arrives.
    Failed { message: String },
}

pub struct Pipeline {
    jobs: SyncSender<Job>,
    busy: Arc<AtomicBool>,
}

impl Pipeline {
    /// Start the render worker. Parameters are fixed for the worker's
    /// lifetime and validated up front.
    pub fn spawn(params: FieldParams) -> Result<(Self, Receiver<Frame>)> {
        params.validate()?;

        let (jobs, job_rx) = mpsc::sync_channel::<Job>(1);
        let (frames, frame_rx) = mpsc::channel::<Frame>();
        let busy = Arc::new(AtomicBool::new(false));

        let worker_busy = Arc::clone(&busy);
        thread::spawn(move || run_worker(params, job_rx, frames, worker_busy));

        Ok((Self { jobs, busy }, frame_rx))
    }

    /// Single-flight job submission. The tuning is snapshotted here, at
    /// acceptance, so later UI mutation cannot tear an in-flight pass.
    /// Returns false when the pipeline is not idle and the request was
    /// dropped; dropped requests get no acknowledgment beyond this.
    pub fn request(&self, kind: JobKind, tuning: &Tuning) -> bool {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let job = Job {
            kind,
            tuning: tuning.clone(),
        };
        match self.jobs.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.busy.store(false, Ordering::Release);
                false
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Completes the handoff. The presentation loop calls this once it has
    /// adopted a `Frame::Blit`; only then may the next job be accepted.
    pub fn mark_idle(&self) {
        self.busy.store(false, Ordering::Release);
    }
}

fn run_worker(
    params: FieldParams,
    jobs: Receiver<Job>,
    frames: Sender<Frame>,
    busy: Arc<AtomicBool>,
) {
    // The field is generated once and cached here; only an explicit
    // Generate job replaces it.
    let mut field: Option<NoiseField> = None;

    while let Ok(job) = jobs.recv() {
        let sent = match render_pass(&params, job.kind, &job.tuning, &mut field) {
            Ok(buffer) => match preview_frame(&buffer) {
                Ok(image) => {
                    let width = buffer.width();
                    let height = buffer.height();
                    frames.send(Frame::Preview { image }).is_ok()
                        && frames
                            .send(Frame::Blit {
                                bytes: buffer.into_bytes(),
                                width,
                                height,
                            })
                            .is_ok()
                    // busy stays set; the blit adopter clears it
                }
                Err(e) => {
                    busy.store(false, Ordering::Release);
                    frames
                        .send(Frame::Failed {
                            message: format!("{e:#}"),
                        })
                        .is_ok()
                }
            },
            Err(e) => {
                busy.store(false, Ordering::Release);
                frames
                    .send(Frame::Failed {
                        message: format!("{e:#}"),
                    })
                    .is_ok()
            }
        };
        if !sent {
            break;
        }
    }
}

fn render_pass(
    params: &FieldParams,
    kind: JobKind,
    tuning: &Tuning,
    field: &mut Option<NoiseField>,
) -> Result<ColorBuffer> {
    if kind == JobKind::Generate || field.is_none() {
        *field = Some(noise::generate(params)?);
    }
    let field = field
        .as_ref()
        .ok_or_else(|| anyhow!("no field cached for recolor"))?;
    Ok(colorize(field, tuning))
}

/// Handoff step 1: encode the buffer to an in-memory PNG and decode it
/// straight back. The round trip hands the presentation side a
/// self-describing image instead of a bare byte layout.
fn preview_frame(buffer: &ColorBuffer) -> Result<RgbImage> {
    let image = RgbImage::from_raw(buffer.width(), buffer.height(), buffer.bytes().to_vec())
        .ok_or_else(|| anyhow!("color buffer does not match its dimensions"))?;

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("preview encode failed")?;

    let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png)
        .context("preview decode failed")?;
    Ok(decoded.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn small_params() -> FieldParams {
        FieldParams {
            width: 8,
            height: 8,
            octaves: 1,
            ..FieldParams::default()
        }
    }

    fn next(frames: &Receiver<Frame>) -> Frame {
        frames
            .recv_timeout(Duration::from_secs(5))
            .expect("worker should produce a frame")
    }

    fn expect_preview(frames: &Receiver<Frame>) -> RgbImage {
        match next(frames) {
            Frame::Preview { image } => image,
            Frame::Blit { .. } => panic!("blit arrived before preview"),
            Frame::Failed { message } => panic!("job failed: {message}"),
        }
    }

    fn expect_blit(frames: &Receiver<Frame>) -> (Vec<u8>, u32, u32) {
        match next(frames) {
            Frame::Blit {
                bytes,
                width,
                height,
            } => (bytes, width, height),
            Frame::Preview { .. } => panic!("second preview instead of blit"),
            Frame::Failed { message } => panic!("job failed: {message}"),
        }
    }

    #[test]
    fn handoff_sends_preview_then_blit() {
        let (pipeline, frames) = Pipeline::spawn(small_params()).unwrap();
        let tuning = Tuning::default();
        assert!(pipeline.request(JobKind::Generate, &tuning));

        let preview = expect_preview(&frames);
        let (bytes, width, height) = expect_blit(&frames);

        assert_eq!((width, height), (8, 8));
        assert_eq!(bytes.len(), 8 * 8 * 3);
        // PNG is lossless: the preview must carry the same pixels.
        assert_eq!(preview.as_raw().as_slice(), bytes.as_slice());

        // The blit matches a direct generate + colorize.
        let field = noise::generate(&small_params()).unwrap();
        let direct = colorize(&field, &tuning);
        assert_eq!(bytes, direct.bytes());
    }

    #[test]
    fn busy_until_blit_is_adopted() {
        let (pipeline, frames) = Pipeline::spawn(small_params()).unwrap();
        let tuning = Tuning::default();

        assert!(!pipeline.is_busy());
        assert!(pipeline.request(JobKind::Generate, &tuning));
        assert!(pipeline.is_busy());

        let _ = expect_preview(&frames);
        let _ = expect_blit(&frames);
        // Both steps delivered, but the handoff is not finished yet.
        assert!(pipeline.is_busy());

        pipeline.mark_idle();
        assert!(!pipeline.is_busy());
    }

    #[test]
    fn concurrent_requests_are_dropped() {
        let (pipeline, frames) = Pipeline::spawn(small_params()).unwrap();
        let tuning = Tuning::default();

        assert!(pipeline.request(JobKind::Generate, &tuning));
        // Still in flight (or at least unadopted): both of these must drop.
        assert!(!pipeline.request(JobKind::Recolor, &tuning));
        assert!(!pipeline.request(JobKind::Generate, &tuning));

        let _ = expect_preview(&frames);
        let _ = expect_blit(&frames);
        pipeline.mark_idle();

        // Exactly one job ran: no further frames are pending.
        assert!(frames.try_recv().is_err());

        // Idle again: requests are accepted.
        assert!(pipeline.request(JobKind::Recolor, &tuning));
    }

    #[test]
    fn recolor_reuses_cached_field() {
        let (pipeline, frames) = Pipeline::spawn(small_params()).unwrap();
        let tuning = Tuning::default();

        assert!(pipeline.request(JobKind::Generate, &tuning));
        let _ = expect_preview(&frames);
        let (first, ..) = expect_blit(&frames);
        pipeline.mark_idle();

        // Unchanged tuning: the recolor must reproduce the original output.
        assert!(pipeline.request(JobKind::Recolor, &tuning));
        let _ = expect_preview(&frames);
        let (second, ..) = expect_blit(&frames);
        pipeline.mark_idle();
        assert_eq!(first, second);

        // Retuned thresholds recolor the same cached field.
        let mut retuned = tuning.clone();
        retuned.set_threshold(1, 100).unwrap();
        assert!(pipeline.request(JobKind::Recolor, &retuned));
        let _ = expect_preview(&frames);
        let (third, ..) = expect_blit(&frames);
        pipeline.mark_idle();

        let field = noise::generate(&small_params()).unwrap();
        assert_eq!(third, colorize(&field, &retuned).into_bytes());
    }

    #[test]
    fn recolor_before_generate_builds_the_field() {
        let (pipeline, frames) = Pipeline::spawn(small_params()).unwrap();
        let tuning = Tuning::default();

        assert!(pipeline.request(JobKind::Recolor, &tuning));
        let _ = expect_preview(&frames);
        let (bytes, ..) = expect_blit(&frames);

        let field = noise::generate(&small_params()).unwrap();
        assert_eq!(bytes, colorize(&field, &tuning).into_bytes());
    }

    #[test]
    fn failed_job_clears_busy_gate() {
        // Drive the worker directly with parameters Pipeline::spawn would
        // refuse, so the abort path is reachable.
        let bad = FieldParams {
            octaves: 0,
            ..small_params()
        };
        let (job_tx, job_rx) = mpsc::sync_channel::<Job>(1);
        let (frame_tx, frame_rx) = mpsc::channel::<Frame>();
        let busy = Arc::new(AtomicBool::new(true));

        let worker_busy = Arc::clone(&busy);
        let handle = thread::spawn(move || run_worker(bad, job_rx, frame_tx, worker_busy));

        job_tx
            .send(Job {
                kind: JobKind::Generate,
                tuning: Tuning::default(),
            })
            .unwrap();

        match frame_rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            Frame::Failed { message } => assert!(message.contains("octave")),
            Frame::Preview { .. } | Frame::Blit { .. } => {
                panic!("degenerate params must abort the job")
            }
        }
        assert!(!busy.load(Ordering::Acquire));

        drop(job_tx);
        handle.join().unwrap();
    }

    #[test]
    fn spawn_rejects_bad_params() {
        let bad = FieldParams {
            octaves: 0,
            ..small_params()
        };
        assert!(Pipeline::spawn(bad).is_err());
    }
}
