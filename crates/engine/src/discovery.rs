//! 감시 대상 파일 탐색
//!
//! 설정된 루트 아래를 재귀적으로 순회하며 [`FileFilter`]를 통과한 일반 파일을 수집합니다.
//! 읽을 수 없는 디렉토리는 경고 로그를 남기고 건너뛰며, 나머지 루트의 탐색은 계속됩니다.
//! 취소 토큰은 디렉토리 단위로 확인합니다.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::SystemTime;

use tokio_util::sync::CancellationToken;

use crate::classify::FileFilter;
use crate::tail::FileKind;

/// 탐색된 파일 한 건
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// 파일 경로
    pub path: PathBuf,
    /// 파일 종류
    pub kind: FileKind,
    /// 탐색 시점의 크기
    pub size: u64,
    /// 탐색 시점의 수정 시각
    pub modified: Option<SystemTime>,
}

/// 탐색 결과
#[derive(Debug, Default)]
pub struct Discovery {
    /// 경로 순으로 정렬된 후보 파일
    pub files: BTreeMap<PathBuf, Candidate>,
    /// 건너뛴 파일시스템 에러 수
    pub errors: u64,
    /// 취소로 중단되었는지 여부
    pub cancelled: bool,
}

/// 루트 목록을 순회하여 후보 파일을 수집합니다.
///
/// 같은 파일이 여러 루트에서 발견되면 대용량 루트의 분류가 우선합니다.
pub async fn discover(
    roots: &[(PathBuf, bool)],
    filter: &FileFilter,
    cancel: &CancellationToken,
) -> Discovery {
    let mut out = Discovery::default();

    for (root, high_volume) in roots {
        let kind = if *high_volume {
            FileKind::HighVolume
        } else {
            FileKind::Generic
        };

        let mut stack = vec![root.clone()];
        while let Some(dir) = stack.pop() {
            if cancel.is_cancelled() {
                out.cancelled = true;
                return out;
            }

            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    out.errors += 1;
                    tracing::warn!(
                        dir = %dir.display(),
                        error = %e,
                        "failed to read directory, skipping"
                    );
                    continue;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        out.errors += 1;
                        tracing::warn!(dir = %dir.display(), error = %e, "failed to read directory entry");
                        break;
                    }
                };

                let path = entry.path();
                let file_type = match entry.file_type().await {
                    Ok(t) => t,
                    Err(e) => {
                        out.errors += 1;
                        tracing::debug!(path = %path.display(), error = %e, "failed to stat entry");
                        continue;
                    }
                };

                if file_type.is_dir() {
                    stack.push(path);
                    continue;
                }

                if !filter.accepts(&path) {
                    continue;
                }

                // 심볼릭 링크는 대상 메타데이터로 판단합니다.
                let metadata = match tokio::fs::metadata(&path).await {
                    Ok(m) if m.is_file() => m,
                    Ok(_) => continue,
                    Err(e) => {
                        out.errors += 1;
                        tracing::debug!(path = %path.display(), error = %e, "failed to read file metadata");
                        continue;
                    }
                };

                let candidate = Candidate {
                    path: path.clone(),
                    kind,
                    size: metadata.len(),
                    modified: metadata.modified().ok(),
                };
                out.files
                    .entry(path)
                    .and_modify(|existing| {
                        if kind == FileKind::HighVolume {
                            existing.kind = kind;
                        }
                    })
                    .or_insert(candidate);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn log_filter() -> FileFilter {
        FileFilter::new(r"(?i)\.log$", r"(?i)^crash-").unwrap()
    }

    #[tokio::test]
    async fn finds_matching_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("top.log"), "x\n").unwrap();
        fs::write(dir.path().join("a/b/deep.LOG"), "").unwrap();
        fs::write(dir.path().join("a/notes.txt"), "").unwrap();
        fs::write(dir.path().join("a/crash-1.log"), "").unwrap();

        let roots = vec![(dir.path().to_path_buf(), false)];
        let found = discover(&roots, &log_filter(), &CancellationToken::new()).await;

        let names: Vec<_> = found
            .files
            .keys()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"top.log".to_owned()));
        assert!(names.contains(&"deep.LOG".to_owned()));
        assert_eq!(found.files[&dir.path().join("top.log")].size, 2);
        assert!(!found.cancelled);
    }

    #[tokio::test]
    async fn missing_root_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ok.log"), "").unwrap();

        let roots = vec![
            (dir.path().join("does-not-exist"), false),
            (dir.path().to_path_buf(), false),
        ];
        let found = discover(&roots, &log_filter(), &CancellationToken::new()).await;
        assert_eq!(found.files.len(), 1);
        assert_eq!(found.errors, 1);
    }

    #[tokio::test]
    async fn high_volume_root_tags_files() {
        let dir = tempfile::tempdir().unwrap();
        let hv = dir.path().join("Script");
        fs::create_dir_all(&hv).unwrap();
        fs::write(hv.join("Script.log"), "").unwrap();

        // 일반 루트가 대용량 루트를 포함하는 경우에도 대용량으로 분류됩니다.
        let roots = vec![(dir.path().to_path_buf(), false), (hv.clone(), true)];
        let found = discover(&roots, &log_filter(), &CancellationToken::new()).await;
        assert_eq!(found.files[&hv.join("Script.log")].kind, FileKind::HighVolume);
    }

    #[tokio::test]
    async fn cancelled_token_stops_discovery() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.log"), "").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let found = discover(&[(dir.path().to_path_buf(), false)], &log_filter(), &cancel).await;
        assert!(found.cancelled);
        assert!(found.files.is_empty());
    }
}
