use cohuff_gpu::{
    compress_huffman, decompress_huffman, EncodeScenario, HuffmanOptions, CONTAINER_HEADER_BYTES,
};

fn build_mixed_dataset(bytes: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes);
    let mut state: u32 = 0x1234_5678;

    while out.len() < bytes {
        let zone = (out.len() / 4096) % 3;
        match zone {
            0 => out.extend_from_slice(b"cohuff-cpu-gpu-huffman-"),
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

fn host_options() -> HuffmanOptions {
    HuffmanOptions {
        prefer_gpu: false,
        ..HuffmanOptions::default()
    }
}

fn assert_roundtrip(input: &[u8], options: &HuffmanOptions) -> cohuff_gpu::CompressedFrame {
    let frame = compress_huffman(input, options).expect("compress should succeed");
    let decoded = decompress_huffman(&frame.bytes).expect("decompress should succeed");
    assert!(!decoded.truncated);
    assert_eq!(decoded.bytes, input);
    frame
}

#[test]
fn roundtrip_across_small_sizes() {
    let dataset = build_mixed_dataset(4096);
    for len in [1usize, 2, 3, 7, 8, 9, 255, 256, 257, 1023, 4096] {
        let frame = assert_roundtrip(&dataset[..len], &host_options());
        assert_eq!(frame.stats.input_bytes, len);
        assert_eq!(
            frame.bytes.len(),
            CONTAINER_HEADER_BYTES + frame.stats.payload_bytes
        );
    }
}

#[test]
fn roundtrip_six_mib_single_kernel() {
    let input = build_mixed_dataset(6 * 1024 * 1024 + 321);
    let frame = assert_roundtrip(&input, &host_options());
    assert_eq!(frame.scenario, EncodeScenario::SingleKernel);
    assert_eq!(frame.stats.kernel_runs, 1);
    assert_eq!(frame.stats.overflow_restarts, 0);
}

#[test]
fn forced_small_budget_switches_to_chunked_kernels() {
    let input = build_mixed_dataset(24 * 1024 * 1024);
    // Just above the fixed cost plus the required 50 MiB of free memory,
    // leaving a window far smaller than the total bit count.
    let budget = 5 * (input.len() as u64 + 1) + 64 * 1024 * 1024;
    let chunked = assert_roundtrip(
        &input,
        &HuffmanOptions {
            prefer_gpu: false,
            scratch_budget_bytes: budget,
            ..HuffmanOptions::default()
        },
    );
    assert_eq!(chunked.scenario, EncodeScenario::Chunked);
    assert!(chunked.stats.kernel_runs > 1);

    // The window layout must not leak into the emitted stream.
    let reference = assert_roundtrip(&input, &host_options());
    assert_eq!(chunked.bytes, reference.bytes);
}

#[test]
fn gpu_backend_matches_host_reference_when_present() {
    let input = build_mixed_dataset(512 * 1024);
    let frame = compress_huffman(
        &input,
        &HuffmanOptions {
            prefer_gpu: true,
            validate_gpu_against_cpu: true,
            ..HuffmanOptions::default()
        },
    )
    .expect("compress should succeed with or without an adapter");

    let reference = compress_huffman(&input, &host_options()).expect("host compress");
    assert_eq!(frame.bytes, reference.bytes);

    let decoded = decompress_huffman(&frame.bytes).expect("decompress should succeed");
    assert_eq!(decoded.bytes, input);
}
