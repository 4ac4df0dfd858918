use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::fs;

use crate::search::Candidate;

/// Hidden subdirectory for saved reference images.
pub const REFS_DIR: &str = ".refs";

/// Map raw image bytes to a file extension by signature alone. Reference
/// downloads can be AVIF/HEIC, which the optimizer's decoder does not handle,
/// so this must stay pure byte matching.
pub fn detect_extension(bytes: &[u8]) -> &'static str {
    if bytes.len() < 12 {
        return ".bin";
    }
    if bytes.starts_with(&[0xff, 0xd8, 0xff]) {
        return ".jpg";
    }
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return ".png";
    }
    if bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        return ".webp";
    }
    if bytes.starts_with(b"GIF8") {
        return ".gif";
    }
    match &bytes[4..12] {
        b"ftypavif" | b"ftypavis" => ".avif",
        b"ftypheic" | b"ftypmif1" => ".heic",
        _ => ".bin",
    }
}

/// Write generated images and the reference images they were built from.
/// Generated outputs land directly in `out_dir` as PNG; references go under
/// `.refs` with an extension sniffed from their bytes. Both lists share one
/// timestamp so a run's artifacts group together.
pub async fn save_outputs(
    generated: &[Vec<u8>],
    references: &[Candidate],
    out_dir: &Path,
) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let refs_dir = out_dir.join(REFS_DIR);
    fs::create_dir_all(&refs_dir).await?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();

    let mut generated_files = Vec::with_capacity(generated.len());
    for (i, data) in generated.iter().enumerate() {
        let path = out_dir.join(format!("product_{timestamp}_{i}.png"));
        fs::write(&path, data).await?;
        generated_files.push(path);
    }

    let mut ref_files = Vec::new();
    for (i, reference) in references.iter().enumerate() {
        if let Some(data) = &reference.image_data {
            let ext = detect_extension(data);
            let path = refs_dir.join(format!("ref_{timestamp}_{i}{ext}"));
            fs::write(&path, data).await?;
            ref_files.push(path);
        }
    }

    Ok((generated_files, ref_files))
}
