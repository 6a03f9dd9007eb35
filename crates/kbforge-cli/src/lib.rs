use anyhow::Context;
use std::path::Path;

use kbforge_core::constants::{MBOX_CONTENT_TYPE, MBOX_EXTENSION, MIB};
use kbforge_core::models::{CandidateFile, FileSource, TrackedFile};

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Human-readable byte size.
pub fn format_size(bytes: u64) -> String {
    if bytes >= MIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

/// MIME type from the file extension; unknown extensions map to `application/octet-stream`.
pub fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("txt") | Some("md") => "text/plain",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some(e) if e == MBOX_EXTENSION => MBOX_CONTENT_TYPE,
        _ => "application/octet-stream",
    }
}

/// Describe a file on disk as an upload candidate without reading it.
pub async fn candidate_from_path(path: &Path) -> anyhow::Result<CandidateFile> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Failed to read file metadata: {}", path.display()))?;
    if !metadata.is_file() {
        anyhow::bail!("Not a file: {}", path.display());
    }

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    Ok(CandidateFile {
        name,
        content_type: guess_content_type(path).to_string(),
        size: metadata.len(),
        source: FileSource::Path(path.to_path_buf()),
    })
}

/// Print the final state of every file of a batch as a table.
pub fn print_batch_table(files: &[TrackedFile]) {
    println!("{:<40} {:>10} {:<10} {}", "FILE", "SIZE", "STATE", "DETAIL");
    for file in files {
        let detail = match (&file.error, &file.mail_stats) {
            (Some(error), _) => error.clone(),
            (None, Some(stats)) => format!(
                "{} sent messages ({} received skipped)",
                stats.emitted, stats.skipped_foreign
            ),
            (None, None) => file.remote_id.clone().unwrap_or_default(),
        };
        println!(
            "{:<40} {:>10} {:<10} {}",
            truncate_string(&file.name, 40),
            format_size(file.size),
            file.state.to_string(),
            detail
        );
    }
}

pub fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
