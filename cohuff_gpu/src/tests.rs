use super::*;

fn patterned_data(len: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(len);
    for i in 0..len {
        data.push(((i as u32 * 31 + 7) % 251) as u8);
    }
    data
}

fn mixed_payload(bytes: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes);
    let mut state: u32 = 0x1234_5678;
    while out.len() < bytes {
        let zone = (out.len() / 4096) % 3;
        match zone {
            0 => out.extend_from_slice(b"cohuff-static-huffman-"),
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

fn lcg_bytes(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut state: u32 = 0x9e37_79b9;
    for _ in 0..len {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        out.push((state >> 24) as u8);
    }
    out
}

fn host_options() -> HuffmanOptions {
    HuffmanOptions {
        prefer_gpu: false,
        ..HuffmanOptions::default()
    }
}

fn codebook_for(input: &[u8]) -> (Box<[u32; 256]>, CodeBook) {
    let histogram = byte_histogram(input);
    let tree = build_tree(&histogram).expect("non-empty input must yield a tree");
    let book = build_codebook(&tree);
    (histogram, book)
}

// Drives the planner, dispatcher and host executor with explicit window
// and wrap limits, then checks the payload-length invariant.
fn encode_via_plan(
    input: &[u8],
    window_bits: u64,
    wrap_limit_bits: u64,
    scenario: EncodeScenario,
) -> (Vec<u8>, OffsetPlan) {
    let (histogram, book) = codebook_for(input);
    let plan = plan_offsets(input, &book, window_bits, wrap_limit_bits, scenario)
        .expect("planner should succeed");
    let runs = build_kernel_runs(input, &book, &plan);
    let payload = encode_payload(input, &plan, &book, &runs, &EncodeBackend::Cpu, false)
        .expect("host encode should succeed");
    let padded = pad_bits_to_byte(total_code_bits(&histogram, &book));
    assert_eq!(payload.len() as u64, padded / 8);
    (payload, plan)
}

fn roundtrip_via_plan(
    input: &[u8],
    window_bits: u64,
    wrap_limit_bits: u64,
    scenario: EncodeScenario,
) -> (Vec<u8>, OffsetPlan) {
    let (payload, plan) = encode_via_plan(input, window_bits, wrap_limit_bits, scenario);
    let histogram = byte_histogram(input);
    let container = frame::encode_container(input.len() as u32, &histogram, &payload)
        .expect("container encode should succeed");
    let decoded = decompress_huffman(&container).expect("decode should succeed");
    assert!(!decoded.truncated);
    assert_eq!(decoded.bytes, input);
    (payload, plan)
}

#[test]
fn single_symbol_container_layout() {
    let frame = compress_huffman(b"aaaa", &host_options()).expect("compress should succeed");
    assert_eq!(frame.scenario, EncodeScenario::SingleKernel);
    assert_eq!(frame.bytes.len(), CONTAINER_HEADER_BYTES + 1);
    assert_eq!(&frame.bytes[..4], &[4, 0, 0, 0]);
    // Frequency entry for b'a'.
    assert_eq!(&frame.bytes[4 + 4 * 97..8 + 4 * 97], &[4, 0, 0, 0]);
    assert_eq!(frame.bytes[CONTAINER_HEADER_BYTES], 0x00);

    let decoded = decompress_huffman(&frame.bytes).expect("decode should succeed");
    assert!(!decoded.truncated);
    assert_eq!(decoded.bytes, b"aaaa");
}

#[test]
fn single_symbol_long_run_is_all_zero_bytes() {
    let input = vec![b'z'; 1000];
    let frame = compress_huffman(&input, &host_options()).expect("compress should succeed");
    let payload = &frame.bytes[CONTAINER_HEADER_BYTES..];
    assert_eq!(payload.len(), 125);
    assert!(payload.iter().all(|&byte| byte == 0));

    let decoded = decompress_huffman(&frame.bytes).expect("decode should succeed");
    assert_eq!(decoded.bytes, input);
}

#[test]
fn two_symbol_payload_packs_msb_first() {
    let frame = compress_huffman(b"ab", &host_options()).expect("compress should succeed");
    assert_eq!(&frame.bytes[CONTAINER_HEADER_BYTES..], &[0x40]);
    let decoded = decompress_huffman(&frame.bytes).expect("decode should succeed");
    assert_eq!(decoded.bytes, b"ab");
}

#[test]
fn abracadabra_payload_is_bit_exact() {
    let frame = compress_huffman(b"abracadabra", &host_options()).expect("compress should succeed");
    // a=0 b=110 r=111 c=100 d=101 under the deterministic build order.
    assert_eq!(&frame.bytes[CONTAINER_HEADER_BYTES..], &[0x6E, 0x8A, 0xDC]);
    assert_eq!(frame.stats.total_code_bits, 23);
    let decoded = decompress_huffman(&frame.bytes).expect("decode should succeed");
    assert_eq!(decoded.bytes, b"abracadabra");
}

#[test]
fn all_distinct_bytes_get_eight_bit_codes() {
    let input: Vec<u8> = (0..=255u8).collect();
    let (histogram, book) = codebook_for(&input);
    assert!(book.lengths.iter().all(|&len| len == 8));
    assert_eq!(total_code_bits(&histogram, &book), 2048);

    let frame = compress_huffman(&input, &host_options()).expect("compress should succeed");
    assert_eq!(frame.bytes.len(), CONTAINER_HEADER_BYTES + 256);
    let decoded = decompress_huffman(&frame.bytes).expect("decode should succeed");
    assert_eq!(decoded.bytes, input);
}

#[test]
fn codebook_is_a_prefix_code() {
    let input = mixed_payload(64 * 1024);
    let (_, book) = codebook_for(&input);
    for first in 0..=255u8 {
        let first_len = usize::from(book.lengths[first as usize]);
        if first_len == 0 {
            continue;
        }
        for second in 0..=255u8 {
            if first == second || book.lengths[second as usize] == 0 {
                continue;
            }
            let second_len = usize::from(book.lengths[second as usize]);
            if first_len > second_len {
                continue;
            }
            let shares_prefix =
                (0..first_len).all(|bit| book.code_bit(first, bit) == book.code_bit(second, bit));
            assert!(
                !shares_prefix,
                "code for {first} is a prefix of the code for {second}"
            );
        }
    }
}

#[test]
fn offsets_follow_code_lengths() {
    let input = patterned_data(4096);
    let (histogram, book) = codebook_for(&input);
    let plan = plan_offsets(
        &input,
        &book,
        u64::MAX / 8,
        OVERFLOW_WRAP_LIMIT_BITS,
        EncodeScenario::SingleKernel,
    )
    .expect("planner should succeed");
    for i in 0..input.len() - 1 {
        let code_len = u32::from(book.lengths[input[i] as usize]);
        assert_eq!(plan.offsets[i + 1] - plan.offsets[i], code_len);
    }
    let padded = pad_bits_to_byte(total_code_bits(&histogram, &book));
    assert_eq!(u64::from(plan.offsets[input.len()]), padded);
    assert!(plan.overflow_index.is_empty());
    assert_eq!(plan.chunk_index, vec![0, input.len() as u32]);
}

#[test]
fn chunk_boundaries_align_to_bytes() {
    let input = patterned_data(4096);
    let (payload, plan) = roundtrip_via_plan(
        &input,
        10_000,
        OVERFLOW_WRAP_LIMIT_BITS,
        EncodeScenario::Chunked,
    );
    let windows = plan.chunk_index.len() / 2;
    assert!(windows >= 3, "expected several windows, got {windows}");
    assert_eq!(plan.chunk_pad.len(), windows);
    assert!(!plan.chunk_pad[0]);
    for k in 0..windows - 1 {
        let end = plan.chunk_index[2 * k + 1] as usize;
        assert_eq!(plan.offsets[end] % 8, 0);
    }

    // Window choice must not change a single emitted bit.
    let (reference, _) = encode_via_plan(
        &input,
        u64::MAX / 8,
        OVERFLOW_WRAP_LIMIT_BITS,
        EncodeScenario::SingleKernel,
    );
    assert_eq!(payload, reference);
}

#[test]
fn mid_byte_chunk_boundary_is_merged() {
    // Eight equally frequent symbols give a flat three-bit code-book, so
    // the first window trigger at bit 999 cannot land on a byte boundary.
    let input = b"abcdefgh".repeat(500);
    let (payload, plan) = roundtrip_via_plan(
        &input,
        1_000,
        OVERFLOW_WRAP_LIMIT_BITS,
        EncodeScenario::Chunked,
    );
    assert!(
        plan.chunk_pad.iter().any(|&pad| pad),
        "expected at least one mid-byte window boundary"
    );
    let (reference, _) = encode_via_plan(
        &input,
        u64::MAX / 8,
        OVERFLOW_WRAP_LIMIT_BITS,
        EncodeScenario::SingleKernel,
    );
    assert_eq!(payload, reference);
}

#[test]
fn overflow_restarts_keep_the_stream_bit_exact() {
    let input = patterned_data(20_000);
    let (payload, plan) = roundtrip_via_plan(
        &input,
        u64::MAX / 8,
        40_000,
        EncodeScenario::SingleKernelOverflow,
    );
    assert!(
        plan.overflow_index.len() >= 2,
        "expected several counter restarts, got {}",
        plan.overflow_index.len()
    );
    let (reference, _) = encode_via_plan(
        &input,
        u64::MAX / 8,
        OVERFLOW_WRAP_LIMIT_BITS,
        EncodeScenario::SingleKernel,
    );
    assert_eq!(payload, reference);
}

#[test]
fn overflow_on_byte_boundary_needs_no_merge() {
    // Single-symbol input: every code is one bit, so a restart limit that
    // is a multiple of eight lands exactly on a byte boundary.
    let input = vec![b'q'; 90_000];
    let (payload, plan) = roundtrip_via_plan(
        &input,
        u64::MAX / 8,
        40_000,
        EncodeScenario::SingleKernelOverflow,
    );
    assert!(!plan.overflow_index.is_empty());
    assert!(plan.overflow_pad.iter().all(|&pad| !pad));
    assert!(payload.iter().all(|&byte| byte == 0));
}

#[test]
fn chunked_overflow_combines_both_boundary_systems() {
    let input = patterned_data(20_000);
    let (payload, plan) =
        roundtrip_via_plan(&input, 96_000, 40_000, EncodeScenario::ChunkedOverflow);
    assert!(!plan.overflow_index.is_empty());
    assert!(plan.chunk_index.len() > 2);

    let (_, book) = codebook_for(&input);
    let runs = build_kernel_runs(&input, &book, &plan);
    assert!(runs.iter().any(|run| run.overflow.is_some()));
    // Every launch handles one window with at most one restart.
    for run in &runs {
        let run_bits = u64::from(run.main_bits)
            + u64::from(run.overflow.map(|overflow| overflow.tail_bits).unwrap_or(0));
        assert!(run_bits <= 96_000 + 255);
    }

    let (reference, _) = encode_via_plan(
        &input,
        u64::MAX / 8,
        OVERFLOW_WRAP_LIMIT_BITS,
        EncodeScenario::SingleKernel,
    );
    assert_eq!(payload, reference);
}

#[test]
fn stitcher_or_merges_the_shared_byte() {
    let mut payload = vec![0b1010_0000u8];
    stitch_segment(&mut payload, &[0b0001_1000, 0xFF], true);
    assert_eq!(payload, vec![0b1011_1000, 0xFF]);

    let mut aligned = vec![0xAAu8];
    stitch_segment(&mut aligned, &[0x55], false);
    assert_eq!(aligned, vec![0xAA, 0x55]);

    let mut untouched = vec![0x01u8];
    stitch_segment(&mut untouched, &[], true);
    assert_eq!(untouched, vec![0x01]);
}

#[test]
fn tree_build_is_deterministic() {
    let input = mixed_payload(32 * 1024);
    let (_, first) = codebook_for(&input);
    let (_, second) = codebook_for(&input);
    assert_eq!(first.lengths, second.lengths);
    assert_eq!(first.fast_bits, second.fast_bits);
    assert_eq!(first.tail_bits, second.tail_bits);
}

#[test]
fn truncated_payload_reports_partial_output() {
    let input = b"abracadabra".repeat(64);
    let frame = compress_huffman(&input, &host_options()).expect("compress should succeed");
    let mut cut = frame.bytes.clone();
    cut.truncate(frame.bytes.len() - 4);

    let decoded = decompress_huffman(&cut).expect("short payload should still decode");
    assert!(decoded.truncated);
    assert!(decoded.bytes.len() < input.len());
    assert_eq!(&input[..decoded.bytes.len()], &decoded.bytes[..]);
}

#[test]
fn container_validation_rejects_malformed_input() {
    assert!(matches!(
        decompress_huffman(&[0u8; 16]),
        Err(CohuffGpuError::InvalidContainer(_))
    ));

    // A header that declares data but carries none.
    let mut header_only = Vec::new();
    header_only.extend_from_slice(&7u32.to_le_bytes());
    let mut histogram = [0u32; 256];
    histogram[b'x' as usize] = 7;
    for count in histogram {
        header_only.extend_from_slice(&count.to_le_bytes());
    }
    assert!(matches!(
        decompress_huffman(&header_only),
        Err(CohuffGpuError::InvalidContainer(_))
    ));

    assert!(matches!(
        compress_huffman(&[], &host_options()),
        Err(CohuffGpuError::InvalidInput(_))
    ));
}

#[test]
fn too_small_budget_reports_figures() {
    let err = compress_huffman(
        b"some data",
        &HuffmanOptions {
            prefer_gpu: false,
            scratch_budget_bytes: 1024 * 1024,
            ..HuffmanOptions::default()
        },
    )
    .expect_err("a 1 MiB budget cannot satisfy the fixed cost");
    match err {
        CohuffGpuError::InsufficientDeviceMemory {
            free_bytes,
            required_bytes,
        } => {
            assert_eq!(free_bytes, 1024 * 1024);
            assert!(required_bytes > free_bytes);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn ten_mib_mixed_data_roundtrip() {
    let input = mixed_payload(10 * 1024 * 1024);
    let frame = compress_huffman(&input, &host_options()).expect("compress should succeed");
    assert_eq!(frame.scenario, EncodeScenario::SingleKernel);
    assert_eq!(frame.stats.kernel_runs, 1);

    let decoded = decompress_huffman(&frame.bytes).expect("decode should succeed");
    assert!(!decoded.truncated);
    assert_eq!(decoded.bytes, input);
}

// Needs roughly 3 GiB of host memory and several minutes; run with
// `cargo test -- --ignored` on a large machine.
#[test]
#[ignore]
fn half_gib_input_exercises_chunked_overflow() {
    let input = lcg_bytes(560 * 1024 * 1024);
    let frame = compress_huffman(&input, &host_options()).expect("compress should succeed");
    assert_eq!(frame.scenario, EncodeScenario::ChunkedOverflow);
    assert!(frame.stats.kernel_runs > 1);
    assert!(frame.stats.overflow_restarts >= 1);
    assert!(frame.stats.total_code_bits > u64::from(u32::MAX));

    let decoded = decompress_huffman(&frame.bytes).expect("decode should succeed");
    assert!(!decoded.truncated);
    assert_eq!(decoded.bytes, input);
}
