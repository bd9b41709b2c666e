use thiserror::Error;

mod frame;
mod gpu;

pub use frame::CONTAINER_HEADER_BYTES;

/// First F bits of every code, kept in the kernel-resident fast region.
pub const FAST_REGION_BITS: usize = 191;
/// Longest representable code; codes past the fast region live here whole.
pub const TAIL_REGION_BITS: usize = 255;

const NODE_POOL_SLOTS: usize = 512;
const NO_CHILD: u32 = u32::MAX;

// Bit-offset counters restart this many bits before u32::MAX wraps.
const OVERFLOW_SAFETY_MARGIN_BITS: u32 = 10_240;
const OVERFLOW_WRAP_LIMIT_BITS: u64 = (u32::MAX - OVERFLOW_SAFETY_MARGIN_BITS) as u64;

const DEVICE_HEADROOM_BYTES: u64 = 10 * 1024 * 1024;
const MIN_FREE_AFTER_FIXED_BYTES: u64 = 50 * 1024 * 1024;
const DEFAULT_HOST_SCRATCH_BYTES: u64 = 4 * 1024 * 1024 * 1024;
// Scratch bit slots are one u32 wide so concurrent scatter writes stay
// word-disjoint; the CPU executor mirrors the layout one byte per slot.
const SCRATCH_BYTES_PER_BIT_SLOT: u64 = 4;

#[derive(Debug, Error)]
pub enum CohuffGpuError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("invalid container: {0}")]
    InvalidContainer(&'static str),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("data too large")]
    DataTooLarge,
    #[error("insufficient device memory: {free_bytes} bytes free, {required_bytes} bytes required")]
    InsufficientDeviceMemory { free_bytes: u64, required_bytes: u64 },
    #[error("gpu error: {0}")]
    Gpu(String),
    #[error("internal error: {0}")]
    Internal(&'static str),
}

#[derive(Debug, Clone)]
pub struct HuffmanOptions {
    // Prefer the GPU executor; falls back to the host executor when no
    // adapter is available.
    pub prefer_gpu: bool,
    // 0 => derive the budget from the adapter limits (GPU) or the host
    // default. Tests use this to force the chunked scenarios.
    pub scratch_budget_bytes: u64,
    // Re-encode every kernel run on the host and compare the packed bytes.
    pub validate_gpu_against_cpu: bool,
}

impl Default for HuffmanOptions {
    fn default() -> Self {
        Self {
            prefer_gpu: true,
            scratch_budget_bytes: 0,
            validate_gpu_against_cpu: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeScenario {
    SingleKernel,
    SingleKernelOverflow,
    Chunked,
    ChunkedOverflow,
}

impl EncodeScenario {
    fn select(kernel_runs: u64, overflow: bool) -> Self {
        match (kernel_runs > 1, overflow) {
            (false, false) => Self::SingleKernel,
            (false, true) => Self::SingleKernelOverflow,
            (true, false) => Self::Chunked,
            (true, true) => Self::ChunkedOverflow,
        }
    }

    pub(crate) fn chunked(self) -> bool {
        matches!(self, Self::Chunked | Self::ChunkedOverflow)
    }

    pub(crate) fn overflow(self) -> bool {
        matches!(self, Self::SingleKernelOverflow | Self::ChunkedOverflow)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompressStats {
    pub input_bytes: usize,
    pub payload_bytes: usize,
    pub total_code_bits: u64,
    pub distinct_symbols: usize,
    pub kernel_runs: usize,
    pub overflow_restarts: usize,
    pub used_gpu: bool,
}

#[derive(Debug, Clone)]
pub struct CompressedFrame {
    pub bytes: Vec<u8>,
    pub scenario: EncodeScenario,
    pub stats: CompressStats,
}

#[derive(Debug, Clone)]
pub struct DecompressedFrame {
    pub bytes: Vec<u8>,
    // The payload ran out before the declared length decoded.
    pub truncated: bool,
}

/*=== frequency scan, tree, code-book ===*/

pub(crate) fn byte_histogram(input: &[u8]) -> Box<[u32; 256]> {
    let mut histogram = Box::new([0u32; 256]);
    for &byte in input {
        histogram[byte as usize] += 1;
    }
    histogram
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeNode {
    pub(crate) byte: u8,
    pub(crate) count: u32,
    pub(crate) left: u32,
    pub(crate) right: u32,
}

pub(crate) struct HuffmanTree {
    pub(crate) pool: Vec<TreeNode>,
    pub(crate) root: u32,
    pub(crate) leaf_count: usize,
}

// Deterministic arena build: leaves enter in ascending byte value, then
// each round stably re-sorts the still-uncombined tail of the pool by
// count and combines the two smallest. Encoder and decoder run this from
// the same histogram, so both sides derive the identical tree.
pub(crate) fn build_tree(histogram: &[u32; 256]) -> Option<HuffmanTree> {
    let mut pool = Vec::with_capacity(NODE_POOL_SLOTS);
    for byte in 0..=255u8 {
        let count = histogram[byte as usize];
        if count > 0 {
            pool.push(TreeNode {
                byte,
                count,
                left: NO_CHILD,
                right: NO_CHILD,
            });
        }
    }
    let leaf_count = pool.len();
    if leaf_count == 0 {
        return None;
    }
    if leaf_count == 1 {
        return Some(HuffmanTree {
            pool,
            root: 0,
            leaf_count,
        });
    }
    for i in 0..leaf_count - 1 {
        // Slots below 2i hold already-combined children and never move
        // again, so the indices recorded in parents stay valid.
        let base = 2 * i;
        pool[base..].sort_by_key(|node| node.count);
        let merged = TreeNode {
            byte: 0,
            count: pool[base].count + pool[base + 1].count,
            left: base as u32,
            right: base as u32 + 1,
        };
        pool.push(merged);
    }
    let root = pool.len() as u32 - 1;
    Some(HuffmanTree {
        pool,
        root,
        leaf_count,
    })
}

pub(crate) struct CodeBook {
    pub(crate) lengths: [u8; 256],
    // One byte per bit, 256 * FAST_REGION_BITS.
    pub(crate) fast_bits: Vec<u8>,
    // Complete sequences for codes longer than the fast region.
    pub(crate) tail_bits: Vec<u8>,
    pub(crate) tail_needed: bool,
}

impl CodeBook {
    pub(crate) fn code_bit(&self, symbol: u8, bit: usize) -> u8 {
        if bit < FAST_REGION_BITS {
            self.fast_bits[symbol as usize * FAST_REGION_BITS + bit]
        } else {
            self.tail_bits[symbol as usize * TAIL_REGION_BITS + bit]
        }
    }
}

pub(crate) fn build_codebook(tree: &HuffmanTree) -> CodeBook {
    let mut book = CodeBook {
        lengths: [0; 256],
        fast_bits: vec![0; 256 * FAST_REGION_BITS],
        tail_bits: vec![0; 256 * TAIL_REGION_BITS],
        tail_needed: false,
    };
    if tree.leaf_count == 1 {
        // A lone symbol still needs one bit per occurrence; decoders agree
        // on the all-zero code.
        let byte = tree.pool[tree.root as usize].byte;
        book.lengths[byte as usize] = 1;
        return book;
    }
    let mut path = [0u8; TAIL_REGION_BITS];
    assign_codes(tree, tree.root, &mut path, 0, &mut book);
    book
}

fn assign_codes(
    tree: &HuffmanTree,
    node_index: u32,
    path: &mut [u8; TAIL_REGION_BITS],
    depth: usize,
    book: &mut CodeBook,
) {
    let node = tree.pool[node_index as usize];
    if node.left == NO_CHILD {
        let symbol = node.byte as usize;
        book.lengths[symbol] = depth as u8;
        let fast_len = depth.min(FAST_REGION_BITS);
        book.fast_bits[symbol * FAST_REGION_BITS..symbol * FAST_REGION_BITS + fast_len]
            .copy_from_slice(&path[..fast_len]);
        if depth > FAST_REGION_BITS {
            book.tail_bits[symbol * TAIL_REGION_BITS..symbol * TAIL_REGION_BITS + depth]
                .copy_from_slice(&path[..depth]);
            book.tail_needed = true;
        }
        return;
    }
    path[depth] = 0;
    assign_codes(tree, node.left, path, depth + 1, book);
    path[depth] = 1;
    assign_codes(tree, node.right, path, depth + 1, book);
}

pub(crate) fn total_code_bits(histogram: &[u32; 256], book: &CodeBook) -> u64 {
    let mut bits = 0u64;
    for symbol in 0..256 {
        bits += u64::from(histogram[symbol]) * u64::from(book.lengths[symbol]);
    }
    bits
}

fn pad_bits_to_byte(bits: u64) -> u64 {
    bits.div_ceil(8) * 8
}

/*=== offset planner ===*/

#[derive(Debug)]
pub(crate) struct OffsetPlan {
    // off[i] = bit position of input byte i's code within its segment;
    // off[N] is padded up to a byte boundary.
    pub(crate) offsets: Vec<u32>,
    pub(crate) overflow_index: Vec<u32>,
    pub(crate) overflow_pad: Vec<bool>,
    // (start, end_exclusive) pairs, one per kernel window.
    pub(crate) chunk_index: Vec<u32>,
    // Entry k is set when window k begins mid-byte.
    pub(crate) chunk_pad: Vec<bool>,
}

pub(crate) fn plan_offsets(
    input: &[u8],
    book: &CodeBook,
    window_bits: u64,
    wrap_limit_bits: u64,
    scenario: EncodeScenario,
) -> Result<OffsetPlan, CohuffGpuError> {
    let n = input.len();
    let mut offsets = vec![0u32; n + 1];
    let mut overflow_index = Vec::new();
    let mut overflow_pad = Vec::new();
    let mut chunk_index = vec![0u32];
    let mut chunk_pad = vec![false];
    let chunking = scenario.chunked();
    let wrapping = scenario.overflow();
    // Padded bits already emitted into the current memory window by
    // overflow restarts; the window trigger compares absolute usage.
    let mut window_base = 0u64;

    for i in 0..n {
        let code_len = u32::from(book.lengths[input[i] as usize]);
        let next = u64::from(offsets[i]) + u64::from(code_len);
        if chunking && next + window_base > window_bits {
            let raw = offsets[i];
            let pad = raw % 8 != 0;
            offsets[i] = round_up_to_byte(raw)?;
            offsets[i + 1] = if pad { raw % 8 + code_len } else { code_len };
            chunk_index.push(i as u32);
            chunk_index.push(i as u32 + 1);
            chunk_pad.push(pad);
            window_base = 0;
        } else if wrapping && next > wrap_limit_bits {
            let raw = offsets[i];
            let pad = raw % 8 != 0;
            offsets[i] = round_up_to_byte(raw)?;
            offsets[i + 1] = if pad { raw % 8 + code_len } else { code_len };
            overflow_index.push(i as u32);
            overflow_pad.push(pad);
            window_base += u64::from(offsets[i]);
        } else {
            offsets[i + 1] = u32::try_from(next).map_err(|_| {
                CohuffGpuError::Internal("bit offset wrapped without overflow handling enabled")
            })?;
        }
    }
    offsets[n] = round_up_to_byte(offsets[n])?;
    chunk_index.push(n as u32);

    Ok(OffsetPlan {
        offsets,
        overflow_index,
        overflow_pad,
        chunk_index,
        chunk_pad,
    })
}

fn round_up_to_byte(bits: u32) -> Result<u32, CohuffGpuError> {
    bits.checked_add(7)
        .map(|v| v & !7)
        .ok_or(CohuffGpuError::Internal(
            "bit padding wrapped the 32-bit counter",
        ))
}

/*=== kernel run dispatch ===*/

#[derive(Debug, Clone, Copy)]
pub(crate) struct RunOverflow {
    pub(crate) index: u32,
    // Scratch-tail position of the restarting byte's code, computed on the
    // host as off[index + 1] - len(input[index]).
    pub(crate) write_pos: u32,
    pub(crate) enter_pad: bool,
    pub(crate) tail_bits: u32,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct KernelRun {
    pub(crate) lo: u32,
    pub(crate) hi: u32,
    // lo > 0: the code of byte lo - 1 straddles the previous boundary and
    // is scattered into this run's scratch at carry_write_pos.
    pub(crate) carry: bool,
    pub(crate) carry_write_pos: u32,
    pub(crate) enter_pad: bool,
    pub(crate) main_bits: u32,
    pub(crate) overflow: Option<RunOverflow>,
}

// Flattens the two boundary systems into kernel launches. A launch covers
// one memory window and at most one overflow restart; a window holding a
// second restart is split there, which leaves the emitted bits unchanged
// because the offset counter restarts at every boundary anyway.
pub(crate) fn build_kernel_runs(
    input: &[u8],
    book: &CodeBook,
    plan: &OffsetPlan,
) -> Vec<KernelRun> {
    #[derive(Clone, Copy, PartialEq)]
    enum BoundaryKind {
        Chunk,
        Overflow,
    }

    let mut boundaries: Vec<(u32, bool, BoundaryKind)> = Vec::new();
    let window_count = plan.chunk_index.len() / 2;
    for k in 0..window_count - 1 {
        boundaries.push((
            plan.chunk_index[2 * k + 1],
            plan.chunk_pad[k + 1],
            BoundaryKind::Chunk,
        ));
    }
    for (p, &index) in plan.overflow_index.iter().enumerate() {
        boundaries.push((index, plan.overflow_pad[p], BoundaryKind::Overflow));
    }
    boundaries.sort_by_key(|&(index, _, _)| index);

    let carry_pos = |lo: u32| -> u32 {
        let straddle_len = u32::from(book.lengths[input[lo as usize - 1] as usize]);
        plan.offsets[lo as usize] - straddle_len
    };

    let mut runs = Vec::new();
    let mut lo = 0u32;
    let mut enter_pad = false;
    let mut open_overflow: Option<(u32, bool, u32)> = None; // (index, pad, main_bits)

    let close_run = |lo: u32,
                         hi: u32,
                         enter_pad: bool,
                         open_overflow: Option<(u32, bool, u32)>,
                         runs: &mut Vec<KernelRun>| {
        let end_bits = plan.offsets[hi as usize];
        let (main_bits, overflow) = match open_overflow {
            Some((index, pad, main_bits)) => {
                let straddle_len = u32::from(book.lengths[input[index as usize] as usize]);
                (
                    main_bits,
                    Some(RunOverflow {
                        index,
                        write_pos: plan.offsets[index as usize + 1] - straddle_len,
                        enter_pad: pad,
                        tail_bits: end_bits,
                    }),
                )
            }
            None => (end_bits, None),
        };
        runs.push(KernelRun {
            lo,
            hi,
            carry: lo > 0,
            carry_write_pos: if lo > 0 { carry_pos(lo) } else { 0 },
            enter_pad,
            main_bits,
            overflow,
        });
    };

    for (index, pad, kind) in boundaries {
        if kind == BoundaryKind::Overflow && open_overflow.is_none() {
            open_overflow = Some((index, pad, plan.offsets[index as usize]));
            continue;
        }
        close_run(lo, index, enter_pad, open_overflow.take(), &mut runs);
        lo = index + 1;
        enter_pad = pad;
    }
    close_run(
        lo,
        input.len() as u32,
        enter_pad,
        open_overflow.take(),
        &mut runs,
    );
    runs
}

pub(crate) struct EncodedSegments {
    pub(crate) main: Vec<u8>,
    pub(crate) tail: Option<Vec<u8>>,
}

/*=== host executor (fallback and kernel reference) ===*/

// Serial rendition of the two kernel phases: scatter every code into a
// byte-per-bit scratch at its planned offset, then pack 8-bit groups
// MSB-first. Segment layout is identical to the device path.
pub(crate) fn cpu_encode_run(
    input: &[u8],
    plan: &OffsetPlan,
    book: &CodeBook,
    run: &KernelRun,
) -> EncodedSegments {
    let mut main_scratch = vec![0u8; run.main_bits as usize];
    let mut tail_scratch = run
        .overflow
        .map(|overflow| vec![0u8; overflow.tail_bits as usize]);

    if run.carry {
        let symbol = input[run.lo as usize - 1];
        scatter_symbol(symbol, run.carry_write_pos, &mut main_scratch, book);
    }
    if let (Some(overflow), Some(tail)) = (run.overflow.as_ref(), tail_scratch.as_mut()) {
        let symbol = input[overflow.index as usize];
        scatter_symbol(symbol, overflow.write_pos, tail, book);
    }
    for i in run.lo..run.hi {
        let target = match (run.overflow.as_ref(), tail_scratch.as_mut()) {
            (Some(overflow), Some(tail)) if i > overflow.index => tail,
            (Some(overflow), _) if i == overflow.index => continue,
            _ => &mut main_scratch,
        };
        scatter_symbol(input[i as usize], plan.offsets[i as usize], target, book);
    }

    EncodedSegments {
        main: pack_scratch_bits(&main_scratch),
        tail: tail_scratch.map(|scratch| pack_scratch_bits(&scratch)),
    }
}

fn scatter_symbol(symbol: u8, write_pos: u32, scratch: &mut [u8], book: &CodeBook) {
    let code_len = usize::from(book.lengths[symbol as usize]);
    let base = write_pos as usize;
    for bit in 0..code_len {
        scratch[base + bit] = book.code_bit(symbol, bit);
    }
}

fn pack_scratch_bits(scratch: &[u8]) -> Vec<u8> {
    let mut packed = Vec::with_capacity(scratch.len() / 8);
    for group in scratch.chunks_exact(8) {
        let mut byte = 0u8;
        for &bit in group {
            byte = (byte << 1) | (bit & 1);
        }
        packed.push(byte);
    }
    packed
}

/*=== stitcher ===*/

// Segments that enter mid-byte share their first physical byte with the
// previous segment's padded last byte; OR-merging the pair restores the
// exact bit concatenation.
pub(crate) fn stitch_segment(payload: &mut Vec<u8>, segment: &[u8], mid_byte: bool) {
    if segment.is_empty() {
        return;
    }
    if mid_byte {
        if let Some(last) = payload.last_mut() {
            *last |= segment[0];
            payload.extend_from_slice(&segment[1..]);
            return;
        }
    }
    payload.extend_from_slice(segment);
}

enum EncodeBackend {
    Cpu,
    Gpu(gpu::GpuEncodeSession),
}

pub(crate) fn encode_payload(
    input: &[u8],
    plan: &OffsetPlan,
    book: &CodeBook,
    runs: &[KernelRun],
    backend: &EncodeBackend,
    validate_gpu: bool,
) -> Result<Vec<u8>, CohuffGpuError> {
    let mut payload = Vec::new();
    for run in runs {
        let segments = match backend {
            EncodeBackend::Cpu => cpu_encode_run(input, plan, book, run),
            EncodeBackend::Gpu(session) => {
                let segments = session.encode_run(input, &plan.offsets, run)?;
                if validate_gpu {
                    let reference = cpu_encode_run(input, plan, book, run);
                    if segments.main != reference.main || segments.tail != reference.tail {
                        return Err(CohuffGpuError::Gpu(
                            "kernel output diverged from the host reference encoder".to_string(),
                        ));
                    }
                }
                segments
            }
        };
        stitch_segment(&mut payload, &segments.main, run.enter_pad);
        if let Some(overflow) = run.overflow {
            let tail = segments.tail.ok_or(CohuffGpuError::Internal(
                "overflow run produced no tail segment",
            ))?;
            stitch_segment(&mut payload, &tail, overflow.enter_pad);
        }
    }
    Ok(payload)
}

/*=== public entry points ===*/

fn fixed_device_bytes(input_len: usize) -> u64 {
    let n = input_len as u64;
    n + 4 * (n + 1) + gpu::DEVICE_CODEBOOK_BYTES
}

pub fn compress_huffman(
    input: &[u8],
    options: &HuffmanOptions,
) -> Result<CompressedFrame, CohuffGpuError> {
    if input.is_empty() {
        return Err(CohuffGpuError::InvalidInput("input is empty"));
    }
    let original_len = u32::try_from(input.len()).map_err(|_| CohuffGpuError::DataTooLarge)?;

    let histogram = byte_histogram(input);
    let tree = build_tree(&histogram).ok_or(CohuffGpuError::Internal(
        "non-empty input produced an empty histogram",
    ))?;
    let book = build_codebook(&tree);
    let code_bits = total_code_bits(&histogram, &book);
    let padded_bits = pad_bits_to_byte(code_bits);

    let gpu_runtime = if options.prefer_gpu {
        gpu::runtime().ok()
    } else {
        None
    };
    let free_bytes = if options.scratch_budget_bytes > 0 {
        options.scratch_budget_bytes
    } else {
        match gpu_runtime {
            Some(runtime) => runtime.buffer_ceiling_bytes(),
            None => DEFAULT_HOST_SCRATCH_BYTES,
        }
    };
    let fixed_bytes = fixed_device_bytes(input.len());
    let required_bytes = fixed_bytes
        .checked_add(MIN_FREE_AFTER_FIXED_BYTES)
        .ok_or(CohuffGpuError::DataTooLarge)?;
    if free_bytes < required_bytes {
        return Err(CohuffGpuError::InsufficientDeviceMemory {
            free_bytes,
            required_bytes,
        });
    }
    let window_bits = (free_bytes - fixed_bytes - DEVICE_HEADROOM_BYTES) / SCRATCH_BYTES_PER_BIT_SLOT;

    let kernel_runs_hint = padded_bits.div_ceil(window_bits).max(1);
    let overflow = window_bits + 255 > u64::from(u32::MAX)
        || padded_bits + 255 > u64::from(u32::MAX);
    let scenario = EncodeScenario::select(kernel_runs_hint, overflow);

    let plan = plan_offsets(input, &book, window_bits, OVERFLOW_WRAP_LIMIT_BITS, scenario)?;
    let runs = build_kernel_runs(input, &book, &plan);

    let backend = match gpu_runtime {
        Some(runtime) => EncodeBackend::Gpu(gpu::GpuEncodeSession::new(runtime, &book)?),
        None => EncodeBackend::Cpu,
    };
    let payload = encode_payload(
        input,
        &plan,
        &book,
        &runs,
        &backend,
        options.validate_gpu_against_cpu,
    )?;
    if payload.len() as u64 != padded_bits / 8 {
        return Err(CohuffGpuError::Internal(
            "stitched payload length disagrees with the code-bit total",
        ));
    }

    let bytes = frame::encode_container(original_len, &histogram, &payload)?;
    let stats = CompressStats {
        input_bytes: input.len(),
        payload_bytes: payload.len(),
        total_code_bits: code_bits,
        distinct_symbols: tree.leaf_count,
        kernel_runs: runs.len(),
        overflow_restarts: plan.overflow_index.len(),
        used_gpu: matches!(backend, EncodeBackend::Gpu(_)),
    };
    Ok(CompressedFrame {
        bytes,
        scenario,
        stats,
    })
}

pub fn decompress_huffman(container: &[u8]) -> Result<DecompressedFrame, CohuffGpuError> {
    let (original_len, histogram, payload) = frame::parse_container(container)?;
    let n = original_len as usize;
    if n == 0 {
        return Ok(DecompressedFrame {
            bytes: Vec::new(),
            truncated: false,
        });
    }
    let tree = build_tree(&histogram).ok_or(CohuffGpuError::InvalidContainer(
        "frequency table has no symbols",
    ))?;

    if tree.leaf_count == 1 {
        // One bit per occurrence was spent; only a short payload can fail.
        let available = payload.len().saturating_mul(8).min(n);
        let symbol = tree.pool[tree.root as usize].byte;
        return Ok(DecompressedFrame {
            bytes: vec![symbol; available],
            truncated: available < n,
        });
    }

    let mut bytes = Vec::with_capacity(n);
    let mut node = tree.root;
    'payload: for &packed in payload {
        let mut current = packed;
        for _ in 0..8 {
            let branch_right = current & 0x80 != 0;
            current <<= 1;
            let step = tree.pool[node as usize];
            node = if branch_right { step.right } else { step.left };
            let candidate = tree.pool[node as usize];
            if candidate.left == NO_CHILD {
                bytes.push(candidate.byte);
                node = tree.root;
                if bytes.len() == n {
                    break 'payload;
                }
            }
        }
    }
    let truncated = bytes.len() < n;
    Ok(DecompressedFrame { bytes, truncated })
}

#[cfg(test)]
mod tests;
