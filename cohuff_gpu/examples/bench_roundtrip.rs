use std::env;
use std::time::{Duration, Instant};

use cohuff_gpu::{compress_huffman, decompress_huffman, HuffmanOptions};

#[derive(Debug, Clone)]
struct BenchConfig {
    size_mib: usize,
    iters: usize,
    warmups: usize,
    prefer_gpu: bool,
    budget_mib: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            size_mib: 8,
            iters: 3,
            warmups: 1,
            prefer_gpu: true,
            budget_mib: 0,
        }
    }
}

impl BenchConfig {
    fn from_args() -> Result<Self, String> {
        let mut cfg = Self::default();
        let mut args = env::args().skip(1);

        while let Some(arg) = args.next() {
            if arg == "--help" || arg == "-h" {
                return Err(help_text());
            }
            if arg == "--cpu" {
                cfg.prefer_gpu = false;
                continue;
            }

            let value = args
                .next()
                .ok_or_else(|| format!("missing value for {}", arg))?;
            match arg.as_str() {
                "--size-mib" => {
                    cfg.size_mib = value
                        .parse::<usize>()
                        .map_err(|_| "invalid --size-mib".to_string())?;
                }
                "--iters" => {
                    cfg.iters = value
                        .parse::<usize>()
                        .map_err(|_| "invalid --iters".to_string())?;
                }
                "--warmups" => {
                    cfg.warmups = value
                        .parse::<usize>()
                        .map_err(|_| "invalid --warmups".to_string())?;
                }
                "--budget-mib" => {
                    cfg.budget_mib = value
                        .parse::<usize>()
                        .map_err(|_| "invalid --budget-mib".to_string())?;
                }
                other => return Err(format!("unknown flag {other}")),
            }
        }
        Ok(cfg)
    }
}

fn help_text() -> String {
    "usage: bench_roundtrip [--size-mib N] [--iters N] [--warmups N] [--budget-mib N] [--cpu]"
        .to_string()
}

fn build_dataset(bytes: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes);
    let mut state: u32 = 0x1234_5678;
    while out.len() < bytes {
        let zone = (out.len() / 4096) % 3;
        match zone {
            0 => out.extend_from_slice(b"cohuff-bench-payload-"),
            1 => out.extend_from_slice(b"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"),
            _ => {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                out.push((state >> 24) as u8);
            }
        }
    }
    out.truncate(bytes);
    out
}

fn throughput_mib_s(bytes: usize, elapsed: Duration) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0)) / elapsed.as_secs_f64().max(1e-9)
}

fn main() {
    let cfg = match BenchConfig::from_args() {
        Ok(cfg) => cfg,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(2);
        }
    };

    let input = build_dataset(cfg.size_mib * 1024 * 1024);
    let options = HuffmanOptions {
        prefer_gpu: cfg.prefer_gpu,
        scratch_budget_bytes: (cfg.budget_mib as u64) * 1024 * 1024,
        ..HuffmanOptions::default()
    };

    for _ in 0..cfg.warmups {
        let frame = compress_huffman(&input, &options).expect("warmup compress failed");
        let _ = decompress_huffman(&frame.bytes).expect("warmup decompress failed");
    }

    for iter in 0..cfg.iters {
        let compress_start = Instant::now();
        let frame = compress_huffman(&input, &options).expect("compress failed");
        let compress_elapsed = compress_start.elapsed();

        let decompress_start = Instant::now();
        let decoded = decompress_huffman(&frame.bytes).expect("decompress failed");
        let decompress_elapsed = decompress_start.elapsed();
        assert_eq!(decoded.bytes, input);

        eprintln!(
            "iter={iter} scenario={:?} runs={} gpu={} ratio={:.3} compress={:.1} MiB/s decompress={:.1} MiB/s",
            frame.scenario,
            frame.stats.kernel_runs,
            frame.stats.used_gpu,
            frame.bytes.len() as f64 / input.len() as f64,
            throughput_mib_s(input.len(), compress_elapsed),
            throughput_mib_s(input.len(), decompress_elapsed),
        );
    }
}
