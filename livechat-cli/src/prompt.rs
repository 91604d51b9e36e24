//! Interactive target entry on stdin.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use livechat_stream::{ListenerSpec, Platform};

fn question(platform: Platform) -> &'static str {
    match platform {
        Platform::Twitch => "Twitch channel (without #)",
        Platform::YouTube => "YouTube video id",
        Platform::TikTok => "TikTok username",
    }
}

/// Ask for one target per platform. Blank answers skip that platform.
pub fn ask_for_targets<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<Vec<ListenerSpec>> {
    writeln!(output, "Enter the streams to listen to (leave blank to skip).")?;

    let mut specs = Vec::new();
    for platform in Platform::ALL {
        write!(output, "{}: ", question(platform))?;
        output.flush()?;

        let mut line = String::new();
        let read = input
            .read_line(&mut line)
            .context("Failed to read from stdin")?;
        if read == 0 {
            break;
        }

        let spec = ListenerSpec::new(platform, line.as_str());
        if spec.is_valid() {
            specs.push(spec);
        }
    }

    Ok(specs)
}
