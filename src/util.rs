use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn date_string(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];

    loop {
        let count = file
            .read(&mut buf)
            .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;
        if count == 0 {
            break;
        }
        hasher.update(&buf[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Replaces every character outside `[a-zA-Z0-9_]` with `_`.
pub fn bq_normalize_name(name: &str) -> Result<String> {
    let pattern = Regex::new(r"[^a-zA-Z0-9_]").context("failed to compile table name regex")?;
    Ok(pattern.replace_all(name, "_").into_owned())
}

pub fn to_json_pretty<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut data = serde_json::to_vec_pretty(value).context("failed to serialize json")?;
    data.push(b'\n');
    Ok(data)
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let data = to_json_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;

    let mut file = File::create(path)
        .with_context(|| format!("failed to create json file: {}", path.display()))?;
    file.write_all(&data)
        .with_context(|| format!("failed to write json file: {}", path.display()))?;

    Ok(())
}

/// Writes `value` next to `path` and renames it into place.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    ensure_directory(parent)?;

    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("invalid file name: {}", path.display()))?;
    let tmp = parent.join(format!(".{}.tmp.{}", name, std::process::id()));

    let data = to_json_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;

    let mut file = File::create(&tmp)
        .with_context(|| format!("failed to create temp file: {}", tmp.display()))?;
    file.write_all(&data)
        .with_context(|| format!("failed to write temp file: {}", tmp.display()))?;
    file.sync_all()
        .with_context(|| format!("failed to sync temp file: {}", tmp.display()))?;
    drop(file);

    fs::rename(&tmp, path).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            tmp.display(),
            path.display()
        )
    })?;

    Ok(())
}

/// Runs `program` to completion, feeding `stdin` when given.
pub fn command_output(program: &str, args: &[&str], stdin: Option<&[u8]>) -> Result<Output> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to run {} {}", program, args.join(" ")))?;

    let pipe = match stdin {
        Some(_) => Some(
            child
                .stdin
                .take()
                .with_context(|| format!("failed to open stdin of {program}"))?,
        ),
        None => None,
    };

    // stdin is fed from its own thread so a child that writes before it
    // finishes reading cannot fill stdout and stall both sides.
    thread::scope(|scope| {
        let writer = pipe
            .zip(stdin)
            .map(|(mut pipe, input)| scope.spawn(move || pipe.write_all(input)));

        let output = child
            .wait_with_output()
            .with_context(|| format!("failed to wait for {} {}", program, args.join(" ")))?;

        if let Some(writer) = writer {
            match writer.join() {
                Ok(written) => {
                    written.with_context(|| format!("failed to write stdin of {program}"))?
                }
                Err(_) => bail!("stdin writer for {program} panicked"),
            }
        }

        Ok(output)
    })
}

/// Like [`command_output`], but a non-zero exit is an error carrying stderr.
pub fn run_command(program: &str, args: &[&str], stdin: Option<&[u8]>) -> Result<Vec<u8>> {
    let output = command_output(program, args, stdin)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{} {} failed: {}", program, args.join(" "), stderr.trim());
    }

    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bq_normalize_name_replaces_non_word_characters() {
        assert_eq!(
            bq_normalize_name("auto-sizing-argo_target_3").expect("normalizes"),
            "auto_sizing_argo_target_3"
        );
        assert_eq!(bq_normalize_name("a.b c").expect("normalizes"), "a_b_c");
    }

    #[cfg(unix)]
    #[test]
    fn command_output_feeds_stdin_while_draining_stdout() {
        let input = vec![b'x'; 256 * 1024];
        let output = command_output(
            "sh",
            &["-c", "head -c 262144 /dev/zero; cat > /dev/null"],
            Some(&input),
        )
        .expect("command completes");

        assert!(output.status.success());
        assert_eq!(output.stdout.len(), 256 * 1024);
    }

    #[test]
    fn write_json_atomic_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/value.json");
        write_json_atomic(&path, &serde_json::json!({"ok": true})).expect("atomic write");

        let entries = fs::read_dir(path.parent().expect("parent"))
            .expect("read dir")
            .count();
        assert_eq!(entries, 1);
        assert_eq!(
            fs::read_to_string(&path).expect("read back"),
            "{\n  \"ok\": true\n}\n"
        );
    }
}
