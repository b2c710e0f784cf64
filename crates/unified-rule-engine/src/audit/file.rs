use super::{DecisionLog, matches_filter};
use crate::error::LogError;
use crate::models::Decision;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// JSONL 文件决策日志
///
/// 每行一个 JSON 序列化的决策，文件只以追加模式打开。
pub struct JsonlDecisionLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlDecisionLog {
    /// 打开（或创建）日志文件
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        // 上次写入中断留下的半行单独成行，后续决策不会拼接到它后面
        if ends_mid_line(&mut file)? {
            warn!("决策日志末尾存在未完成的行, 已补换行: {}", path.display());
            file.write_all(b"\n")?;
            file.flush()?;
        }
        debug!("决策日志已打开: {}", path.display());

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DecisionLog for JsonlDecisionLog {
    fn append(&self, decision: Decision) -> Result<(), LogError> {
        let mut line = serde_json::to_string(&decision)?;
        line.push('\n');

        // 整行一次写入，持锁期间保证行不交错
        let mut file = self.file.lock();
        append_line(&mut *file, line.as_bytes())?;
        Ok(())
    }

    fn query(&self, ruleset_id: Option<&str>) -> Result<Vec<Decision>, LogError> {
        let _guard = self.file.lock();

        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut decisions = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<Decision>(&line) {
                Ok(decision) => {
                    if matches_filter(&decision, ruleset_id) {
                        decisions.push(decision);
                    }
                }
                Err(e) => {
                    warn!(
                        "跳过损坏的决策日志行: {}:{}: {}",
                        self.path.display(),
                        line_no + 1,
                        e
                    );
                }
            }
        }

        Ok(decisions)
    }
}

/// 可截断的追加目标
trait Truncate {
    fn size(&self) -> io::Result<u64>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl Truncate for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// 追加一行，写入失败时截断回写入前的长度
fn append_line<W: Write + Truncate>(writer: &mut W, line: &[u8]) -> io::Result<()> {
    let previous_len = writer.size()?;
    if let Err(e) = writer.write_all(line).and_then(|()| writer.flush()) {
        if let Err(rollback) = writer.truncate(previous_len) {
            warn!("决策日志写入失败后回滚失败: {}", rollback);
        }
        return Err(e);
    }
    Ok(())
}

fn ends_mid_line(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
