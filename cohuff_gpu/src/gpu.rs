use super::*;
use std::sync::mpsc;
use std::sync::OnceLock;

use bytemuck::{Pod, Zeroable};

const WORKGROUP_SIZE: u32 = 256;
const MAX_DISPATCH_WORKGROUPS_PER_DIM: u32 = 65_535;

const CODE_FAST_WORDS_PER_SYMBOL: usize = 6; // 191 bits
const CODE_TAIL_WORDS_PER_SYMBOL: usize = 8; // 255 bits
const NO_OVERFLOW: u32 = u32::MAX;

// Device-resident code-book: 256 length words, the packed fast region and
// the packed tail region.
pub(super) const DEVICE_CODEBOOK_BYTES: u64 =
    (256 * 4 + 256 * CODE_FAST_WORDS_PER_SYMBOL * 4 + 256 * CODE_TAIL_WORDS_PER_SYMBOL * 4) as u64;

// Phase 1: every invocation scatters one input byte's code into the
// bit-granular scratch (one u32 per bit slot, so writes stay
// word-disjoint). Invocation 0 additionally places the boundary bytes: the
// code straddling the previous window boundary goes to the head of the
// main scratch, the code straddling the overflow restart to the head of
// the overflow scratch.
const SCATTER_SHADER: &str = r#"
struct ScatterParams {
    slice_base: u32,
    range_lo: u32,
    range_hi: u32,
    overflow_index: u32,
    carry: u32,
    carry_write_pos: u32,
    overflow_write_pos: u32,
    tail_codes: u32,
}

@group(0) @binding(0)
var<storage, read> input_words: array<u32>;
@group(0) @binding(1)
var<storage, read> bit_offsets: array<u32>;
@group(0) @binding(2)
var<storage, read> code_lengths: array<u32>;
@group(0) @binding(3)
var<storage, read> code_fast_words: array<u32>;
@group(0) @binding(4)
var<storage, read> code_tail_words: array<u32>;
@group(0) @binding(5)
var<storage, read_write> scratch_bits: array<u32>;
@group(0) @binding(6)
var<storage, read_write> overflow_scratch_bits: array<u32>;
@group(0) @binding(7)
var<uniform> params: ScatterParams;

const FAST_REGION_BITS: u32 = 191u;
const FAST_WORDS_PER_SYMBOL: u32 = 6u;
const TAIL_WORDS_PER_SYMBOL: u32 = 8u;
const NO_OVERFLOW: u32 = 0xffffffffu;

fn input_byte(slice_index: u32) -> u32 {
    let word = input_words[slice_index / 4u];
    let shift = (slice_index % 4u) * 8u;
    return (word >> shift) & 0xffu;
}

fn code_bit(symbol: u32, bit: u32) -> u32 {
    if (params.tail_codes == 1u && bit >= FAST_REGION_BITS) {
        let word = code_tail_words[symbol * TAIL_WORDS_PER_SYMBOL + (bit / 32u)];
        return (word >> (bit % 32u)) & 1u;
    }
    let word = code_fast_words[symbol * FAST_WORDS_PER_SYMBOL + (bit / 32u)];
    return (word >> (bit % 32u)) & 1u;
}

fn scatter_symbol(input_index: u32, write_pos: u32, into_overflow: u32) {
    let symbol = input_byte(input_index - params.slice_base);
    let len = code_lengths[symbol];
    var bit: u32 = 0u;
    loop {
        if (bit >= len) {
            break;
        }
        let value = code_bit(symbol, bit);
        if (into_overflow == 1u) {
            overflow_scratch_bits[write_pos + bit] = value;
        } else {
            scratch_bits[write_pos + bit] = value;
        }
        bit = bit + 1u;
    }
}

@compute @workgroup_size(256)
fn scatter_codes(@builtin(global_invocation_id) id: vec3<u32>) {
    let t = id.x + (id.y * 16776960u);
    if (t == 0u) {
        if (params.carry == 1u) {
            scatter_symbol(params.range_lo - 1u, params.carry_write_pos, 0u);
        }
        if (params.overflow_index != NO_OVERFLOW) {
            scatter_symbol(params.overflow_index, params.overflow_write_pos, 1u);
        }
    }
    let count = params.range_hi - params.range_lo;
    if (t >= count) {
        return;
    }
    let i = params.range_lo + t;
    if (i == params.overflow_index) {
        return;
    }
    var into_overflow: u32 = 0u;
    if (params.overflow_index != NO_OVERFLOW && i > params.overflow_index) {
        into_overflow = 1u;
    }
    scatter_symbol(i, bit_offsets[i - params.slice_base], into_overflow);
}
"#;

// Phase 2: each invocation assembles one output word from 32 scratch bit
// slots, every payload byte packed MSB-first.
const PACK_SHADER: &str = r#"
struct PackParams {
    bit_count: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

@group(0) @binding(0)
var<storage, read> scratch_bits: array<u32>;
@group(0) @binding(1)
var<storage, read_write> packed_words: array<u32>;
@group(0) @binding(2)
var<uniform> params: PackParams;

fn bit_at(pos: u32) -> u32 {
    if (pos >= params.bit_count) {
        return 0u;
    }
    return scratch_bits[pos] & 1u;
}

@compute @workgroup_size(256)
fn pack_bits(@builtin(global_invocation_id) id: vec3<u32>) {
    let word_index = id.x + (id.y * 16776960u);
    let word_count = (params.bit_count + 31u) / 32u;
    if (word_index >= word_count) {
        return;
    }
    var word: u32 = 0u;
    var lane: u32 = 0u;
    loop {
        if (lane >= 4u) {
            break;
        }
        let group_base = ((word_index * 4u) + lane) * 8u;
        var value: u32 = 0u;
        var bit: u32 = 0u;
        loop {
            if (bit >= 8u) {
                break;
            }
            value = (value << 1u) | bit_at(group_base + bit);
            bit = bit + 1u;
        }
        word = word | (value << (lane * 8u));
        lane = lane + 1u;
    }
    packed_words[word_index] = word;
}
"#;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ScatterParams {
    slice_base: u32,
    range_lo: u32,
    range_hi: u32,
    overflow_index: u32,
    carry: u32,
    carry_write_pos: u32,
    overflow_write_pos: u32,
    tail_codes: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PackParams {
    bit_count: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

#[derive(Debug)]
pub(super) struct GpuRuntime {
    device: wgpu::Device,
    queue: wgpu::Queue,
    scatter_bind_group_layout: wgpu::BindGroupLayout,
    scatter_pipeline: wgpu::ComputePipeline,
    pack_bind_group_layout: wgpu::BindGroupLayout,
    pack_pipeline: wgpu::ComputePipeline,
    buffer_ceiling_bytes: u64,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl GpuRuntime {
    fn init() -> Result<Self, CohuffGpuError> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| CohuffGpuError::Gpu("no suitable GPU adapter".to_string()))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("cohuff-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .map_err(|e| CohuffGpuError::Gpu(format!("request_device failed: {e}")))?;

        let limits = device.limits();
        let buffer_ceiling_bytes =
            u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);

        let scatter_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("cohuff-scatter"),
            source: wgpu::ShaderSource::Wgsl(SCATTER_SHADER.into()),
        });
        let pack_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("cohuff-pack"),
            source: wgpu::ShaderSource::Wgsl(PACK_SHADER.into()),
        });

        let scatter_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("cohuff-scatter-bgl"),
                entries: &[
                    storage_entry(0, true),
                    storage_entry(1, true),
                    storage_entry(2, true),
                    storage_entry(3, true),
                    storage_entry(4, true),
                    storage_entry(5, false),
                    storage_entry(6, false),
                    uniform_entry(7),
                ],
            });
        let pack_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("cohuff-pack-bgl"),
                entries: &[
                    storage_entry(0, true),
                    storage_entry(1, false),
                    uniform_entry(2),
                ],
            });

        let scatter_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("cohuff-scatter-pl"),
                bind_group_layouts: &[&scatter_bind_group_layout],
                push_constant_ranges: &[],
            });
        let pack_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("cohuff-pack-pl"),
                bind_group_layouts: &[&pack_bind_group_layout],
                push_constant_ranges: &[],
            });

        let scatter_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("cohuff-scatter-cp"),
            layout: Some(&scatter_pipeline_layout),
            module: &scatter_shader,
            entry_point: "scatter_codes",
        });
        let pack_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("cohuff-pack-cp"),
            layout: Some(&pack_pipeline_layout),
            module: &pack_shader,
            entry_point: "pack_bits",
        });

        Ok(Self {
            device,
            queue,
            scatter_bind_group_layout,
            scatter_pipeline,
            pack_bind_group_layout,
            pack_pipeline,
            buffer_ceiling_bytes,
        })
    }

    pub(super) fn buffer_ceiling_bytes(&self) -> u64 {
        self.buffer_ceiling_bytes
    }
}

pub(super) fn runtime() -> Result<&'static GpuRuntime, CohuffGpuError> {
    static RUNTIME: OnceLock<Result<GpuRuntime, CohuffGpuError>> = OnceLock::new();
    RUNTIME
        .get_or_init(GpuRuntime::init)
        .as_ref()
        .map_err(|e| CohuffGpuError::Gpu(format!("{e}")))
}

fn pack_bytes_to_words(bytes: &[u8]) -> Vec<u32> {
    let mut words = Vec::with_capacity(bytes.len().div_ceil(4));
    for chunk in bytes.chunks(4) {
        let mut tmp = [0_u8; 4];
        tmp[..chunk.len()].copy_from_slice(chunk);
        words.push(u32::from_le_bytes(tmp));
    }
    words
}

fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len().saturating_mul(4));
    for &w in words {
        out.extend_from_slice(&w.to_le_bytes());
    }
    out
}

// Bit-packed upload image of one code-book region: bit j of symbol s sits
// in word s * words_per_symbol + j / 32.
fn pack_code_region(bits: &[u8], stride_bits: usize, words_per_symbol: usize) -> Vec<u32> {
    let mut words = vec![0u32; 256 * words_per_symbol];
    for symbol in 0..256 {
        for bit in 0..stride_bits {
            if bits[symbol * stride_bits + bit] != 0 {
                words[symbol * words_per_symbol + bit / 32] |= 1 << (bit % 32);
            }
        }
    }
    words
}

// The shaders rebuild the linear index as id.x + id.y * 65535 * 256.
fn dispatch_extent(items: u32) -> (u32, u32) {
    let groups = items.div_ceil(WORKGROUP_SIZE).max(1);
    let x = groups.min(MAX_DISPATCH_WORKGROUPS_PER_DIM);
    let y = groups.div_ceil(MAX_DISPATCH_WORKGROUPS_PER_DIM);
    (x, y)
}

#[derive(Debug)]
pub(super) struct GpuEncodeSession {
    runtime: &'static GpuRuntime,
    code_lengths_buffer: wgpu::Buffer,
    code_fast_buffer: wgpu::Buffer,
    code_tail_buffer: wgpu::Buffer,
    tail_codes: bool,
}

impl GpuEncodeSession {
    pub(super) fn new(
        runtime: &'static GpuRuntime,
        book: &CodeBook,
    ) -> Result<Self, CohuffGpuError> {
        let mut length_words = Vec::with_capacity(256);
        for &len in book.lengths.iter() {
            length_words.push(u32::from(len));
        }
        let fast_words =
            pack_code_region(&book.fast_bits, FAST_REGION_BITS, CODE_FAST_WORDS_PER_SYMBOL);
        let tail_words =
            pack_code_region(&book.tail_bits, TAIL_REGION_BITS, CODE_TAIL_WORDS_PER_SYMBOL);

        let code_lengths_buffer = create_storage_buffer(
            &runtime.device,
            "cohuff-code-lengths",
            (length_words.len() * 4) as u64,
        )?;
        let code_fast_buffer = create_storage_buffer(
            &runtime.device,
            "cohuff-code-fast",
            (fast_words.len() * 4) as u64,
        )?;
        let code_tail_buffer = create_storage_buffer(
            &runtime.device,
            "cohuff-code-tail",
            (tail_words.len() * 4) as u64,
        )?;
        runtime
            .queue
            .write_buffer(&code_lengths_buffer, 0, &words_to_bytes(&length_words));
        runtime
            .queue
            .write_buffer(&code_fast_buffer, 0, &words_to_bytes(&fast_words));
        runtime
            .queue
            .write_buffer(&code_tail_buffer, 0, &words_to_bytes(&tail_words));

        Ok(Self {
            runtime,
            code_lengths_buffer,
            code_fast_buffer,
            code_tail_buffer,
            tail_codes: book.tail_needed,
        })
    }

    pub(super) fn encode_run(
        &self,
        input: &[u8],
        offsets: &[u32],
        run: &KernelRun,
    ) -> Result<EncodedSegments, CohuffGpuError> {
        let runtime = self.runtime;
        let lo = run.lo as usize;
        let hi = run.hi as usize;
        let slice_base = if run.carry { lo - 1 } else { lo };

        let input_words = pack_bytes_to_words(&input[slice_base..hi]);
        let offset_slice = &offsets[slice_base..hi];

        let tail_bits = run.overflow.map(|overflow| overflow.tail_bits).unwrap_or(0);
        let main_scratch_bytes = (u64::from(run.main_bits) * 4).max(4);
        let tail_scratch_bytes = (u64::from(tail_bits) * 4).max(4);
        let main_payload_bytes = run.main_bits as usize / 8;
        let tail_payload_bytes = tail_bits as usize / 8;
        let main_out_bytes = ((main_payload_bytes.div_ceil(4)) * 4).max(4) as u64;
        let tail_out_bytes = ((tail_payload_bytes.div_ceil(4)) * 4).max(4) as u64;

        let input_buffer = create_storage_buffer(
            &runtime.device,
            "cohuff-run-input",
            ((input_words.len() * 4).max(4)) as u64,
        )?;
        let offsets_buffer = create_storage_buffer(
            &runtime.device,
            "cohuff-run-offsets",
            ((offset_slice.len() * 4).max(4)) as u64,
        )?;
        let main_scratch_buffer =
            create_storage_buffer(&runtime.device, "cohuff-run-scratch", main_scratch_bytes)?;
        let tail_scratch_buffer = create_storage_buffer(
            &runtime.device,
            "cohuff-run-overflow-scratch",
            tail_scratch_bytes,
        )?;
        let main_out_buffer = runtime.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cohuff-run-packed"),
            size: main_out_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let tail_out_buffer = runtime.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cohuff-run-overflow-packed"),
            size: tail_out_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let main_readback_buffer = runtime.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cohuff-run-readback"),
            size: main_out_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let tail_readback_buffer = runtime.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cohuff-run-overflow-readback"),
            size: tail_out_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        runtime
            .queue
            .write_buffer(&input_buffer, 0, &words_to_bytes(&input_words));
        runtime
            .queue
            .write_buffer(&offsets_buffer, 0, &words_to_bytes(offset_slice));

        let scatter_params = ScatterParams {
            slice_base: slice_base as u32,
            range_lo: run.lo,
            range_hi: run.hi,
            overflow_index: run
                .overflow
                .map(|overflow| overflow.index)
                .unwrap_or(NO_OVERFLOW),
            carry: u32::from(run.carry),
            carry_write_pos: run.carry_write_pos,
            overflow_write_pos: run
                .overflow
                .map(|overflow| overflow.write_pos)
                .unwrap_or(0),
            tail_codes: u32::from(self.tail_codes),
        };
        let scatter_params_buffer = create_uniform_buffer(
            &runtime.device,
            "cohuff-scatter-params",
            bytemuck::bytes_of(&scatter_params),
            &runtime.queue,
        );
        let main_pack_params = PackParams {
            bit_count: run.main_bits,
            _pad0: 0,
            _pad1: 0,
            _pad2: 0,
        };
        let main_pack_params_buffer = create_uniform_buffer(
            &runtime.device,
            "cohuff-pack-params",
            bytemuck::bytes_of(&main_pack_params),
            &runtime.queue,
        );
        let tail_pack_params = PackParams {
            bit_count: tail_bits,
            _pad0: 0,
            _pad1: 0,
            _pad2: 0,
        };
        let tail_pack_params_buffer = create_uniform_buffer(
            &runtime.device,
            "cohuff-overflow-pack-params",
            bytemuck::bytes_of(&tail_pack_params),
            &runtime.queue,
        );

        let scatter_bind_group = runtime
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("cohuff-scatter-bg"),
                layout: &runtime.scatter_bind_group_layout,
                entries: &[
                    bind(0, &input_buffer),
                    bind(1, &offsets_buffer),
                    bind(2, &self.code_lengths_buffer),
                    bind(3, &self.code_fast_buffer),
                    bind(4, &self.code_tail_buffer),
                    bind(5, &main_scratch_buffer),
                    bind(6, &tail_scratch_buffer),
                    bind(7, &scatter_params_buffer),
                ],
            });
        let main_pack_bind_group = runtime
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("cohuff-pack-bg"),
                layout: &runtime.pack_bind_group_layout,
                entries: &[
                    bind(0, &main_scratch_buffer),
                    bind(1, &main_out_buffer),
                    bind(2, &main_pack_params_buffer),
                ],
            });
        let tail_pack_bind_group = runtime
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("cohuff-overflow-pack-bg"),
                layout: &runtime.pack_bind_group_layout,
                entries: &[
                    bind(0, &tail_scratch_buffer),
                    bind(1, &tail_out_buffer),
                    bind(2, &tail_pack_params_buffer),
                ],
            });

        let mut encoder = runtime
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("cohuff-run-encoder"),
            });
        {
            // Successive dispatches in one pass order their storage
            // writes; this is the scatter/pack phase barrier.
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("cohuff-run-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&runtime.scatter_pipeline);
            pass.set_bind_group(0, &scatter_bind_group, &[]);
            let (x, y) = dispatch_extent(run.hi - run.lo);
            pass.dispatch_workgroups(x, y, 1);

            pass.set_pipeline(&runtime.pack_pipeline);
            pass.set_bind_group(0, &main_pack_bind_group, &[]);
            let (x, y) = dispatch_extent(run.main_bits.div_ceil(32));
            pass.dispatch_workgroups(x, y, 1);
            if run.overflow.is_some() {
                pass.set_bind_group(0, &tail_pack_bind_group, &[]);
                let (x, y) = dispatch_extent(tail_bits.div_ceil(32));
                pass.dispatch_workgroups(x, y, 1);
            }
        }
        encoder.copy_buffer_to_buffer(&main_out_buffer, 0, &main_readback_buffer, 0, main_out_bytes);
        if run.overflow.is_some() {
            encoder.copy_buffer_to_buffer(&tail_out_buffer, 0, &tail_readback_buffer, 0, tail_out_bytes);
        }
        runtime.queue.submit(Some(encoder.finish()));

        let (main_tx, main_rx) = mpsc::channel();
        main_readback_buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = main_tx.send(result);
            });
        let tail_rx = if run.overflow.is_some() {
            let (tail_tx, tail_rx) = mpsc::channel();
            tail_readback_buffer
                .slice(..)
                .map_async(wgpu::MapMode::Read, move |result| {
                    let _ = tail_tx.send(result);
                });
            Some(tail_rx)
        } else {
            None
        };
        let _ = runtime.device.poll(wgpu::Maintain::Wait);

        let main = read_mapped_bytes(&main_readback_buffer, main_rx, main_payload_bytes)?;
        let tail = match tail_rx {
            Some(rx) => Some(read_mapped_bytes(
                &tail_readback_buffer,
                rx,
                tail_payload_bytes,
            )?),
            None => None,
        };
        Ok(EncodedSegments { main, tail })
    }
}

fn bind(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}

fn create_storage_buffer(
    device: &wgpu::Device,
    label: &str,
    size: u64,
) -> Result<wgpu::Buffer, CohuffGpuError> {
    if size > u64::from(device.limits().max_storage_buffer_binding_size) {
        return Err(CohuffGpuError::Gpu(format!(
            "{label}: {size} bytes exceeds the storage binding limit"
        )));
    }
    Ok(device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    }))
}

fn create_uniform_buffer(
    device: &wgpu::Device,
    label: &str,
    contents: &[u8],
    queue: &wgpu::Queue,
) -> wgpu::Buffer {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: contents.len() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    queue.write_buffer(&buffer, 0, contents);
    buffer
}

fn read_mapped_bytes(
    buffer: &wgpu::Buffer,
    rx: mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
    byte_len: usize,
) -> Result<Vec<u8>, CohuffGpuError> {
    let map_result = rx
        .recv()
        .map_err(|_| CohuffGpuError::Gpu("map_async completion channel closed".to_string()))?;
    map_result.map_err(|e| CohuffGpuError::Gpu(format!("map_async failed: {e}")))?;
    let mapped = buffer.slice(..).get_mapped_range();
    let bytes = mapped[..byte_len].to_vec();
    drop(mapped);
    buffer.unmap();
    Ok(bytes)
}
