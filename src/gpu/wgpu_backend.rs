//! wgpu compute backend for sparsity propagation.
//!
//! Cross-platform (Metal, Vulkan, DX12). Masks are `u32` since WGSL has no
//! 64-bit integers, so each invocation carries 32 seeds.

use super::{GpuError, GpuTapeData, SparsityMeta};
use crate::backend::SparsityBackend;
use crate::sparsity::Sparsity;
use crate::tape::{Direction, Tape};

/// Seeds per invocation.
const WORD_BITS: usize = 32;
const WORKGROUP_SIZE: u32 = 64;

/// wgpu compute context: device, queue and both propagation pipelines.
pub struct WgpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    forward_pipeline: wgpu::ComputePipeline,
    adjoint_pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl WgpuContext {
    /// Acquire a GPU device. Returns `None` if no suitable adapter is found.
    pub fn new() -> Option<Self> {
        pollster::block_on(Self::new_async())
    }

    async fn new_async() -> Option<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok()?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default())
            .await
            .ok()?;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tapegraph_sparsity_bgl"),
            entries: &[
                // binding 0: SparsityMeta uniform
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                bgl_storage_ro(1), // arity
                bgl_storage_ro(2), // out
                bgl_storage_ro(3), // arg0
                bgl_storage_ro(4), // arg1
                bgl_storage_rw(5), // work [num_words * num_slots]
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tapegraph_sparsity_pl"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("tapegraph_sparsity_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/sparsity.wgsl").into()),
        });

        let pipeline = |entry: &'static str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry),
                layout: Some(&layout),
                module: &shader,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            })
        };
        let forward_pipeline = pipeline("forward");
        let adjoint_pipeline = pipeline("adjoint");

        Some(Self {
            device,
            queue,
            forward_pipeline,
            adjoint_pipeline,
            bind_group_layout,
        })
    }

    /// Run every seed word of one propagation and return the raw masks,
    /// `num_words * num_slots` entries.
    fn run(
        &self,
        data: &GpuTapeData,
        work_init: &[u32],
        num_words: u32,
        dir: Direction,
    ) -> Result<Vec<u32>, GpuError> {
        use wgpu::util::DeviceExt;

        let work_size = (work_init.len() * 4) as u64;
        if work_size > u64::from(self.device.limits().max_storage_buffer_binding_size) {
            return Err(GpuError::OutOfMemory);
        }

        let meta = SparsityMeta {
            num_instructions: data.num_instructions,
            num_slots: data.num_slots,
            num_words,
            _pad: 0,
        };
        let meta_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("sparsity_meta"),
                contents: bytemuck::bytes_of(&meta),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let storage = |label: &str, contents: &[u32]| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytemuck::cast_slice(contents),
                    usage: wgpu::BufferUsages::STORAGE,
                })
        };
        let arity_buf = storage("arity", &data.arity);
        let out_buf = storage("out", &data.out);
        let arg0_buf = storage("arg0", &data.arg0);
        let arg1_buf = storage("arg1", &data.arg1);
        let work_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("work"),
                contents: bytemuck::cast_slice(work_init),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            });
        let staging_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging"),
            size: work_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sparsity_bg"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: meta_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: arity_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: out_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: arg0_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: arg1_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: work_buf.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("sparsity_enc"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("sparsity_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(match dir {
                Direction::Forward => &self.forward_pipeline,
                Direction::Adjoint => &self.adjoint_pipeline,
            });
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(num_words.div_ceil(WORKGROUP_SIZE), 1, 1);
        }
        encoder.copy_buffer_to_buffer(&work_buf, 0, &staging_buf, 0, work_size);
        let sub_idx = self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging_buf.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::PollType::Wait {
            submission_index: Some(sub_idx),
            timeout: None,
        });

        rx.recv()
            .map_err(|e| GpuError::Other(format!("channel recv failed: {e}")))?
            .map_err(|e| GpuError::BufferMap(e.to_string()))?;

        let mapped = slice.get_mapped_range();
        let result: Vec<u32> = bytemuck::cast_slice(&mapped).to_vec();
        drop(mapped);
        staging_buf.unmap();

        Ok(result)
    }
}

impl SparsityBackend for WgpuContext {
    fn name(&self) -> &'static str {
        "gpu-wgpu"
    }

    fn propagate(
        &self,
        tape: &Tape,
        iind: usize,
        oind: usize,
        dir: Direction,
    ) -> crate::error::Result<Sparsity> {
        let num_words = tape.num_batches(iind, oind, dir, WORD_BITS);
        if num_words == 0 {
            return Ok(tape.pattern_from_pairs(iind, oind, &[]));
        }
        let data = GpuTapeData::from_tape(tape);
        let ns = tape.num_slots();

        let mut work = vec![0u32; num_words * ns];
        for w in 0..num_words {
            for (s, mask) in tape.seed_batch(iind, oind, dir, w, WORD_BITS) {
                work[w * ns + s] |= mask as u32;
            }
        }

        let masks = self.run(&data, &work, num_words as u32, dir)?;

        let mut pairs = Vec::new();
        let mut words = Vec::with_capacity(ns);
        for w in 0..num_words {
            words.clear();
            words.extend(masks[w * ns..(w + 1) * ns].iter().map(|&m| u64::from(m)));
            tape.read_batch(iind, oind, dir, w, WORD_BITS, &words, &mut pairs);
        }
        log::trace!(
            "gpu sparsity ({dir:?}, input {iind}, output {oind}): {num_words} words, {} entries",
            pairs.len()
        );
        Ok(tape.pattern_from_pairs(iind, oind, &pairs))
    }
}

// ── Helpers ──

fn bgl_storage_ro(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bgl_storage_rw(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
