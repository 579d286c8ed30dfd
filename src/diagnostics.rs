// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

/// Final diagnostic report printed before a failed run exits.
use std::{env, fs, path::Path};

use crate::error::Error;

/// Describes `error` together with the working directory and its contents.
pub fn failure_summary(error: &Error,) -> String
{
    match env::current_dir() {
        Ok(dir,) => summary_for(error, &dir,),
        Err(e,) => format!("{error}\n\nWorking directory unavailable: {e}"),
    }
}

fn summary_for(error: &Error, dir: &Path,) -> String
{
    let mut summary = format!("{error}\n\nWorking directory: {}", dir.display());

    let mut entries: Vec<String,> = match fs::read_dir(dir,) {
        Ok(entries,) => entries
            .flatten()
            .map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                if entry.path().is_dir() { format!("{name}/") } else { name }
            },)
            .collect(),
        Err(e,) => {
            summary.push_str(&format!("\nUnable to list files: {e}"),);
            return summary;
        }
    };
    entries.sort();

    if entries.is_empty() {
        summary.push_str("\nDirectory is empty",);
    } else {
        summary.push_str("\nAvailable files:",);
        for entry in entries {
            summary.push_str(&format!("\n  - {entry}"),);
        }
    }

    summary
}
