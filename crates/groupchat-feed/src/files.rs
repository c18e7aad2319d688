use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use groupchat_core::attachment::OutgoingFile;
use mime::Mime;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::error::FeedError;

const FALLBACK_NAME: &str = "attachment";

/// MIME type for `file_name`, from its extension.
pub fn guess_mime(file_name: &str) -> Mime {
    mime_guess::from_path(file_name).first_or_octet_stream()
}

/// Load a file from disk for upload.
pub async fn read_outgoing_file(path: &Path) -> Result<OutgoingFile, FeedError> {
    let data = fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| FALLBACK_NAME.to_string());
    let mime_type = guess_mime(&file_name).to_string();
    Ok(OutgoingFile::new(file_name, mime_type, Bytes::from(data)))
}

/// Write `data` into `dir` under a cleaned-up `file_name`.
/// Never overwrites: `a.pdf` becomes `a (1).pdf`, `a (2).pdf`, ...
pub async fn save_attachment(dir: &Path, file_name: &str, data: &[u8]) -> Result<PathBuf, FeedError> {
    fs::create_dir_all(dir).await?;
    let name = sanitize_file_name(file_name);

    let mut n = 0u32;
    loop {
        let path = dir.join(candidate_name(&name, n));
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => {
                write_or_remove(file, &path, data).await?;
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Write `data` through `out`; on failure the file at `path` is removed
/// so no partial download is left behind.
async fn write_or_remove<W>(mut out: W, path: &Path, data: &[u8]) -> Result<(), FeedError>
where
    W: AsyncWrite + Unpin,
{
    let written = match out.write_all(data).await {
        Ok(()) => out.flush().await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        drop(out);
        if let Err(rm) = fs::remove_file(path).await {
            warn!(path = %path.display(), "could not remove partial file: {rm}");
        }
        return Err(e.into());
    }
    Ok(())
}

/// Strip directories and characters that are not portable in file names.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').trim();
    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

fn candidate_name(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    match name.rfind('.').filter(|&i| i > 0) {
        Some(i) => format!("{} ({n}){}", &name[..i], &name[i..]),
        None => format!("{name} ({n})"),
    }
}
