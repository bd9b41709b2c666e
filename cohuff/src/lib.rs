use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use thiserror::Error;

pub use cohuff_cpu::{CohuffCpuError, SerialDecompressed};
pub use cohuff_gpu::{
    CohuffGpuError, CompressStats, CompressedFrame, DecompressedFrame, EncodeScenario,
    HuffmanOptions,
};

#[derive(Debug, Error)]
pub enum CohuffError {
    #[error("input file {path} is empty")]
    EmptyInput { path: String },
    #[error("{path}: {source}")]
    File {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Parallel(#[from] CohuffGpuError),
    #[error(transparent)]
    Serial(#[from] CohuffCpuError),
}

#[derive(Debug, Clone)]
pub struct CompressReport {
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub elapsed: Duration,
    pub scenario: EncodeScenario,
    pub stats: CompressStats,
}

#[derive(Debug, Clone)]
pub struct DecompressReport {
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub elapsed: Duration,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct SerialCompressReport {
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub elapsed: Duration,
}

fn read_input(path: &Path) -> Result<Vec<u8>, CohuffError> {
    let data = fs::read(path).map_err(|source| CohuffError::File {
        path: path.display().to_string(),
        source,
    })?;
    if data.is_empty() {
        return Err(CohuffError::EmptyInput {
            path: path.display().to_string(),
        });
    }
    Ok(data)
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<(), CohuffError> {
    fs::write(path, bytes).map_err(|source| CohuffError::File {
        path: path.display().to_string(),
        source,
    })
}

pub fn compress_file(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    options: &HuffmanOptions,
) -> Result<CompressReport, CohuffError> {
    let data = read_input(input_path.as_ref())?;
    let start = Instant::now();
    let frame = cohuff_gpu::compress_huffman(&data, options)?;
    let elapsed = start.elapsed();
    write_output(output_path.as_ref(), &frame.bytes)?;
    Ok(CompressReport {
        input_bytes: data.len() as u64,
        output_bytes: frame.bytes.len() as u64,
        elapsed,
        scenario: frame.scenario,
        stats: frame.stats,
    })
}

pub fn decompress_file(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
) -> Result<DecompressReport, CohuffError> {
    let data = read_input(input_path.as_ref())?;
    let start = Instant::now();
    let decoded = cohuff_gpu::decompress_huffman(&data)?;
    let elapsed = start.elapsed();
    // A truncated payload still produces its partial prefix.
    write_output(output_path.as_ref(), &decoded.bytes)?;
    Ok(DecompressReport {
        input_bytes: data.len() as u64,
        output_bytes: decoded.bytes.len() as u64,
        elapsed,
        truncated: decoded.truncated,
    })
}

pub fn compress_file_serial(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
) -> Result<SerialCompressReport, CohuffError> {
    let data = read_input(input_path.as_ref())?;
    let start = Instant::now();
    let bytes = cohuff_cpu::compress_serial(&data)?;
    let elapsed = start.elapsed();
    write_output(output_path.as_ref(), &bytes)?;
    Ok(SerialCompressReport {
        input_bytes: data.len() as u64,
        output_bytes: bytes.len() as u64,
        elapsed,
    })
}

pub fn decompress_file_serial(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
) -> Result<DecompressReport, CohuffError> {
    let data = read_input(input_path.as_ref())?;
    let start = Instant::now();
    let decoded = cohuff_cpu::decompress_serial(&data)?;
    let elapsed = start.elapsed();
    write_output(output_path.as_ref(), &decoded.bytes)?;
    Ok(DecompressReport {
        input_bytes: data.len() as u64,
        output_bytes: decoded.bytes.len() as u64,
        elapsed,
        truncated: decoded.truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn scratch_path(name: &str) -> std::path::PathBuf {
        let mut path = env::temp_dir();
        path.push(format!("cohuff-test-{}-{name}", std::process::id()));
        path
    }

    #[test]
    fn file_roundtrip_through_both_codecs() {
        let input_path = scratch_path("input.bin");
        let packed_path = scratch_path("packed.chf");
        let restored_path = scratch_path("restored.bin");
        let data = b"cohuff file roundtrip payload ".repeat(1024);
        fs::write(&input_path, &data).expect("write input");

        let options = HuffmanOptions {
            prefer_gpu: false,
            ..HuffmanOptions::default()
        };
        let report =
            compress_file(&input_path, &packed_path, &options).expect("compress should succeed");
        assert_eq!(report.input_bytes, data.len() as u64);
        let restored =
            decompress_file(&packed_path, &restored_path).expect("decompress should succeed");
        assert!(!restored.truncated);
        assert_eq!(fs::read(&restored_path).expect("read restored"), data);

        let serial_report = compress_file_serial(&input_path, &packed_path)
            .expect("serial compress should succeed");
        assert_eq!(serial_report.input_bytes, data.len() as u64);
        let serial_restored = decompress_file_serial(&packed_path, &restored_path)
            .expect("serial decompress should succeed");
        assert!(!serial_restored.truncated);
        assert_eq!(fs::read(&restored_path).expect("read restored"), data);

        for path in [&input_path, &packed_path, &restored_path] {
            let _ = fs::remove_file(path);
        }
    }

    #[test]
    fn empty_input_is_rejected_before_the_codec_runs() {
        let input_path = scratch_path("empty.bin");
        let output_path = scratch_path("empty.chf");
        fs::write(&input_path, b"").expect("write input");

        let err = compress_file(&input_path, &output_path, &HuffmanOptions::default())
            .expect_err("empty input must be rejected");
        assert!(matches!(err, CohuffError::EmptyInput { .. }));
        let _ = fs::remove_file(&input_path);
    }
}
