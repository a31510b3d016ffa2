// src/main.rs
use std::io::{self, Stdout, Write};
use std::sync::mpsc::Receiver;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute, queue,
    style::{Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, BeginSynchronizedUpdate, Clear, ClearType, DisableLineWrap, EnableLineWrap,
        EndSynchronizedUpdate, EnterAlternateScreen, LeaveAlternateScreen,
    },
};

use isoband::color::Rgb;
use isoband::config::{Tuning, SWATCHES};
use isoband::noise::FieldParams;
use isoband::pipeline::{Frame, JobKind, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "isoband")]
#[command(about = "False-color noise field with retunable thresholds")]
struct Args {
    /// field width in samples
    #[arg(long, default_value_t = 1024)]
    width: u32,

    /// field height in samples
    #[arg(long, default_value_t = 512)]
    height: u32,

    /// noise frequency across the field
    #[arg(long, default_value_t = 5.0)]
    scale: f32,

    /// lattice-space offset of the sampled window
    #[arg(long, default_value_t = 10.0)]
    offset: f32,

    /// fractal octaves
    #[arg(long, default_value_t = 2)]
    octaves: u32,

    /// permutation-table seed
    #[arg(long, default_value_t = 0x5EED)]
    seed: u64,

    /// comma-separated ascending thresholds, e.g. 64,128,192
    #[arg(long, default_value = "64,128,192")]
    thresholds: String,

    /// ms per UI tick
    #[arg(long, default_value_t = 33)]
    ms: u64,
}

const HUD_ROWS: u16 = 3;
const BACKDROP: Rgb = Rgb::new(6, 7, 11);

struct TermGuard {
    out: Stdout,
}

impl TermGuard {
    fn new() -> io::Result<Self> {
        let mut out = io::stdout();
        terminal::enable_raw_mode()?;
        execute!(
            out,
            EnterAlternateScreen,
            DisableLineWrap,
            cursor::Hide,
            cursor::MoveTo(0, 0)
        )?;
        Ok(Self { out })
    }
}

impl Drop for TermGuard {
    fn drop(&mut self) {
        let _ = execute!(
            self.out,
            EndSynchronizedUpdate,
            ResetColor,
            cursor::Show,
            EnableLineWrap,
            LeaveAlternateScreen
        );
        let _ = terminal::disable_raw_mode();
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct Cell {
    ch: char,
    fg: Rgb,
    bg: Rgb,
}

impl Cell {
    fn blank() -> Self {
        Self {
            ch: ' ',
            fg: Rgb::new(255, 255, 255),
            bg: BACKDROP,
        }
    }
}

/// Double-buffered cell grid for the field area below the HUD. Only cells
/// that changed since the previous flush are written out.
struct ScreenDiff {
    w: u16,
    h: u16,
    prev: Vec<Cell>,
    next: Vec<Cell>,
}

impl ScreenDiff {
    fn new(w: u16, h: u16) -> Self {
        let n = w as usize * h as usize;
        Self {
            w,
            h,
            prev: vec![Cell::blank(); n],
            next: vec![Cell::blank(); n],
        }
    }

    fn resize(&mut self, w: u16, h: u16) -> bool {
        if self.w == w && self.h == h {
            return false;
        }
        *self = Self::new(w, h);
        true
    }

    fn set_next(&mut self, x: u16, y: u16, cell: Cell) {
        if x >= self.w || y >= self.h {
            return;
        }
        self.next[y as usize * self.w as usize + x as usize] = cell;
    }

    fn flush<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        let mut last_fg: Option<Rgb> = None;
        let mut last_bg: Option<Rgb> = None;

        for y in 0..self.h {
            for x in 0..self.w {
                let i = y as usize * self.w as usize + x as usize;
                if self.prev[i] == self.next[i] {
                    continue;
                }
                let c = self.next[i];

                queue!(out, cursor::MoveTo(x, y + HUD_ROWS))?;
                if last_bg != Some(c.bg) {
                    queue!(out, SetBackgroundColor(c.bg.to_color()))?;
                    last_bg = Some(c.bg);
                }
                if last_fg != Some(c.fg) {
                    queue!(out, SetForegroundColor(c.fg.to_color()))?;
                    last_fg = Some(c.fg);
                }
                queue!(out, Print(c.ch))?;
            }
        }

        std::mem::swap(&mut self.prev, &mut self.next);
        Ok(())
    }
}

/// Whatever the display currently shows: preview pixels from the fast path
/// or the canonical raw blit.
struct Texture {
    width: u32,
    height: u32,
    bytes: Vec<u8>,
    stage: &'static str,
}

impl Texture {
    fn pixel(&self, x: u32, y: u32) -> Rgb {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        Rgb::new(self.bytes[i], self.bytes[i + 1], self.bytes[i + 2])
    }
}

/// Nearest-sample the texture into the cell grid, two vertical pixels per
/// cell (`▀`: fg is the top pixel, bg the bottom), letterboxed to preserve
/// aspect.
fn blit_texture(diff: &mut ScreenDiff, tex: &Texture) {
    let px_w = diff.w as usize;
    let px_h = diff.h as usize * 2;
    if px_w == 0 || px_h == 0 {
        return;
    }

    let src_w = tex.width as usize;
    let src_h = tex.height as usize;
    let scale = (px_w as f32 / src_w as f32).min(px_h as f32 / src_h as f32);
    let fit_w = ((src_w as f32 * scale) as usize).clamp(1, px_w);
    let fit_h = ((src_h as f32 * scale) as usize).clamp(1, px_h);
    let pad_x = (px_w - fit_w) / 2;
    let pad_y = (px_h - fit_h) / 2;

    let sample = |px: usize, py: usize| -> Rgb {
        if px < pad_x || px >= pad_x + fit_w || py < pad_y || py >= pad_y + fit_h {
            return BACKDROP;
        }
        let sx = (px - pad_x) * src_w / fit_w;
        let sy = (py - pad_y) * src_h / fit_h;
        tex.pixel(sx as u32, sy as u32)
    };

    for ty in 0..diff.h {
        for tx in 0..diff.w {
            let top = sample(tx as usize, ty as usize * 2);
            let bottom = sample(tx as usize, ty as usize * 2 + 1);
            diff.set_next(
                tx,
                ty,
                Cell {
                    ch: '▀',
                    fg: top,
                    bg: bottom,
                },
            );
        }
    }
}

fn draw_hud<W: Write>(
    out: &mut W,
    params: &FieldParams,
    tuning: &Tuning,
    selected: usize,
    busy: bool,
    stage: &str,
    last_error: &Option<String>,
) -> io::Result<()> {
    queue!(
        out,
        ResetColor,
        cursor::MoveTo(0, 0),
        Clear(ClearType::UntilNewLine)
    )?;
    queue!(
        out,
        Print(format!(
            "isoband  field:{}x{}  octaves:{}  scale:{}  offset:{}  seed:{:#x}  state:{}  frame:{}",
            params.width,
            params.height,
            params.octaves,
            params.scale,
            params.offset,
            params.seed,
            if busy { "busy" } else { "idle" },
            stage,
        ))
    )?;

    queue!(out, cursor::MoveTo(0, 1), Clear(ClearType::UntilNewLine))?;
    let thresholds = tuning.thresholds();
    let k = thresholds.len();
    for (i, color) in tuning.colors().iter().enumerate() {
        let (open, close) = if i == selected { ('[', ']') } else { (' ', ' ') };
        queue!(out, Print(open))?;
        queue!(
            out,
            SetForegroundColor(color.to_color()),
            Print("██"),
            ResetColor
        )?;
        let label = if i < k {
            format!("<={}", thresholds[i])
        } else {
            format!(">{}", thresholds[k - 1])
        };
        queue!(out, Print(label), Print(close))?;
    }

    queue!(out, cursor::MoveTo(0, 2), Clear(ClearType::UntilNewLine))?;
    let mut line = String::from(
        "keys: q quit  tab band  arrows threshold (shift=10)  c color  u update  g regen",
    );
    if let Some(e) = last_error {
        line.push_str("   ERR: ");
        line.push_str(e);
    }
    queue!(out, Print(line))?;
    Ok(())
}

fn parse_thresholds(list: &str) -> Result<Vec<u8>> {
    list.split(',')
        .map(|part| {
            part.trim()
                .parse::<u8>()
                .with_context(|| format!("bad threshold {part:?}"))
        })
        .collect()
}

fn default_palette(bands: usize) -> Vec<Rgb> {
    (0..bands).map(|i| SWATCHES[i % SWATCHES.len()]).collect()
}

fn main() -> Result<()> {
    let args = Args::parse();

    let params = FieldParams {
        width: args.width,
        height: args.height,
        scale: args.scale,
        offset: args.offset,
        octaves: args.octaves,
        seed: args.seed,
    };
    let thresholds = parse_thresholds(&args.thresholds)?;
    let palette = default_palette(thresholds.len() + 1);
    let mut tuning = Tuning::new(thresholds, palette)?;

    let (pipeline, frames) = Pipeline::spawn(params).context("failed to start render worker")?;
    pipeline.request(JobKind::Generate, &tuning);

    let mut tg = TermGuard::new()?;
    run(
        &mut tg.out,
        &params,
        &pipeline,
        &frames,
        &mut tuning,
        Duration::from_millis(args.ms),
    )
}

fn run(
    out: &mut Stdout,
    params: &FieldParams,
    pipeline: &Pipeline,
    frames: &Receiver<Frame>,
    tuning: &mut Tuning,
    tick: Duration,
) -> Result<()> {
    let (cols, rows) = terminal::size()?;
    let mut diff = ScreenDiff::new(cols, rows.saturating_sub(HUD_ROWS));
    let mut texture: Option<Texture> = None;
    let mut selected: usize = 0;
    let mut last_error: Option<String> = None;

    loop {
        // Presentation-side task queue: frames are adopted in enqueue order.
        while let Ok(frame) = frames.try_recv() {
            match frame {
                Frame::Preview { image } => {
                    texture = Some(Texture {
                        width: image.width(),
                        height: image.height(),
                        bytes: image.into_raw(),
                        stage: "preview",
                    });
                }
                Frame::Blit {
                    bytes,
                    width,
                    height,
                } => {
                    texture = Some(Texture {
                        width,
                        height,
                        bytes,
                        stage: "final",
                    });
                    // Handoff complete; the pipeline may take new jobs.
                    pipeline.mark_idle();
                    last_error = None;
                }
                Frame::Failed { message } => {
                    last_error = Some(message);
                }
            }
        }

        let (cols, rows) = terminal::size()?;
        if diff.resize(cols, rows.saturating_sub(HUD_ROWS)) {
            execute!(out, Clear(ClearType::All))?;
        }

        queue!(out, BeginSynchronizedUpdate)?;
        if let Some(tex) = &texture {
            blit_texture(&mut diff, tex);
            diff.flush(out)?;
        }
        draw_hud(
            out,
            params,
            tuning,
            selected,
            pipeline.is_busy(),
            texture.as_ref().map(|t| t.stage).unwrap_or("-"),
            &last_error,
        )?;
        queue!(out, ResetColor, EndSynchronizedUpdate)?;
        out.flush()?;

        if !event::poll(tick)? {
            continue;
        }
        while event::poll(Duration::from_millis(0))? {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match (key.code, key.modifiers) {
                (KeyCode::Char('q') | KeyCode::Char('Q'), _) => return Ok(()),

                // Recolor with the current tuning; dropped silently if a job
                // is already in flight.
                (KeyCode::Char('u') | KeyCode::Char('U'), _) => {
                    pipeline.request(JobKind::Recolor, tuning);
                }
                (KeyCode::Char('g') | KeyCode::Char('G'), _) => {
                    pipeline.request(JobKind::Generate, tuning);
                }

                (KeyCode::Tab, _) => selected = (selected + 1) % tuning.bands(),
                (KeyCode::BackTab, _) => {
                    selected = (selected + tuning.bands() - 1) % tuning.bands()
                }

                (KeyCode::Left | KeyCode::Right, mods) => {
                    let k = tuning.thresholds().len();
                    // The last band has no upper boundary to move.
                    if selected < k {
                        let step: i16 = if mods.contains(KeyModifiers::SHIFT) { 10 } else { 1 };
                        let step = if key.code == KeyCode::Left { -step } else { step };
                        let lo = if selected > 0 {
                            tuning.thresholds()[selected - 1] as i16 + 1
                        } else {
                            0
                        };
                        let hi = if selected + 1 < k {
                            tuning.thresholds()[selected + 1] as i16 - 1
                        } else {
                            255
                        };
                        if lo <= hi {
                            let cur = tuning.thresholds()[selected] as i16;
                            let target = (cur + step).clamp(lo, hi) as u8;
                            if let Err(e) = tuning.set_threshold(selected, target) {
                                last_error = Some(format!("{e:#}"));
                            }
                        }
                    }
                }

                (KeyCode::Char('c') | KeyCode::Char('C'), _) => {
                    let cur = tuning.colors()[selected];
                    let next = SWATCHES
                        .iter()
                        .position(|&s| s == cur)
                        .map(|i| (i + 1) % SWATCHES.len())
                        .unwrap_or(0);
                    if let Err(e) = tuning.set_color(selected, SWATCHES[next]) {
                        last_error = Some(format!("{e:#}"));
                    }
                }

                _ => {}
            }
        }
    }
}
