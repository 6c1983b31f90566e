// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Headless demo player.
// Run with: cargo run -p sandbox -- --frames 48 --fps 24

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use strobe_runtime::{logging, FnJob, JobContext, Player, PlayerConfig};
use strobe_workers::{
    encode_stream, DocumentHeader, FrameItem, FrameSize, InputEvent, Rgb, Tag,
};

/// Plays a synthetic tag stream without a window, then shuts down.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Player configuration file; defaults apply when it does not exist.
    #[arg(short, long, default_value = "Player.toml")]
    config: PathBuf,

    /// Frames in the generated stream.
    #[arg(long, default_value_t = 48)]
    frames: u16,

    /// Frame rate of the generated stream.
    #[arg(long, default_value_t = 24.0)]
    fps: f32,

    /// Stop after this many milliseconds.
    #[arg(long, default_value_t = 3000)]
    duration_ms: u32,
}

fn demo_stream(frames: u16, fps: f32) -> Result<Vec<u8>> {
    let mut tags = vec![Tag::SetBackgroundColor(Rgb::new(0x20, 0x20, 0x30))];
    for frame in 0..frames {
        tags.push(Tag::Control(FrameItem {
            code: 26,
            payload: Arc::from(frame.to_le_bytes().to_vec()),
        }));
        tags.push(Tag::ShowFrame);
    }
    tags.push(Tag::End);

    let header = DocumentHeader {
        version: 10,
        file_length: 0,
        frame_size: FrameSize {
            width: 550,
            height: 400,
        },
        frame_rate: fps,
        frame_count: frames,
    };
    encode_stream(&header, &tags).context("Failed to encode the demo stream")
}

fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();

    let config = PlayerConfig::load(&args.config)
        .with_context(|| format!("Failed to load '{}'", args.config.display()))?;
    let stream = demo_stream(args.frames, args.fps)?;

    let mut player = Player::start(config).context("Failed to start the player")?;

    let control = player.control();
    player.add_wait(
        args.duration_ms,
        Arc::new(FnJob::new("stop", move |_: &JobContext| {
            control.set_shutdown_flag();
        })),
    );
    player.add_listener(
        "mouseDown",
        Arc::new(|event: &InputEvent| log::info!("Input: {event:?}")),
    );
    if let Some(injector) = player.input_injector() {
        injector.send(InputEvent::MouseDown { x: 275.0, y: 200.0 });
    }

    let parse = player.load(Cursor::new(stream))?;
    let outcome = player.wait();

    let summary = parse.wait()?;
    log::info!(
        "Parsed {} frames ({} bytes).",
        summary.frames,
        summary.bytes_read
    );
    if let Some(stats) = player.render_stats() {
        log::info!(
            "Drew {} frames ({} failed), {} us total render time.",
            stats.frames_drawn,
            stats.failed_draws,
            stats.render_time_us
        );
    }
    player.shutdown();

    outcome.context("Player stopped with an error")
}
