// Copyright 2024 Icinga GmbH
// This file is part of ido-writer.

// ido-writer is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// ido-writer is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with ido-writer.  If not, see <http://www.gnu.org/licenses/>.

use fern::colors::{Color, ColoredLevelConfig};
use log::error;

/// Initializes process-wide logging: colored output to stdout at `std`,
/// plus a file at `file_lvl` under the platform's local data directory.
/// Library code never calls this itself; only the CLI binary does, so the
/// crate stays embeddable.
pub fn init_logger(std: log::LevelFilter, file_lvl: log::LevelFilter) {
    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red)
        .debug(Color::Blue)
        .trace(Color::Magenta);

    let mut log_dir = dirs::data_local_dir().expect("failed to find local data dir for logs");
    log_dir.push("ido_writer");
    create_dir(log_dir.clone());
    log_dir.push("ido_writer.log");

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}][{}] {} ::{};{}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                colors.color(record.level()),
                message,
                format_opt(record.file().map(|s| s.to_string())),
                format_opt(record.line().map(|n| n.to_string()))
            ))
        })
        .chain(
            fern::Dispatch::new()
                .level(log::LevelFilter::Info)
                .level_for("ido_writer", file_lvl)
                .level_for("diesel", log::LevelFilter::Warn)
                .chain(fern::log_file(log_dir).expect("failed to create ido_writer log file")),
        )
        .chain(fern::Dispatch::new().level(std).chain(std::io::stdout()))
        .apply()
        .expect("could not init logging");
}

/// Panics if directory creation fails for any reason other than the
/// directory already existing.
fn create_dir(path: std::path::PathBuf) {
    match std::fs::create_dir_all(&path) {
        Err(e) => match e.kind() {
            std::io::ErrorKind::AlreadyExists => (),
            _ => {
                error!("failed to create log directory {}: {}", path.display(), e);
                std::process::exit(0x0100);
            }
        },
        Ok(_) => (),
    }
}

fn format_opt(file: Option<String>) -> String {
    match file {
        None => "".to_string(),
        Some(f) => f,
    }
}
