//! Per-frame host-visible buffer ring
//!
//! One uniform region and one instance region per slot, allocated once at
//! startup and reused every `len()` frames. The ring does no synchronization
//! of its own; the frame gate guarantees a slot is idle before it comes round
//! again.

use crate::render::api::frame_data::{GlobalUniforms, InstanceData};
use crate::render::api::render_backend::{BufferUsage, HostBuffer, RenderBackend};
use crate::render::{RenderError, RenderResult};

/// One ring slot's regions
#[derive(Debug)]
pub struct FrameSlot<M> {
    index: usize,
    uniforms: M,
    instances: M,
    instance_capacity: usize,
}

impl<M: HostBuffer> FrameSlot<M> {
    /// Wrap pre-allocated regions as slot `index`
    pub fn new(index: usize, uniforms: M, instances: M) -> RenderResult<Self> {
        let uniform_size = std::mem::size_of::<GlobalUniforms>();
        if uniforms.size() < uniform_size {
            return Err(RenderError::InvalidConfig(format!(
                "uniform region of {} bytes cannot hold {} bytes of globals",
                uniforms.size(),
                uniform_size
            )));
        }
        let instance_capacity = instances.size() / std::mem::size_of::<InstanceData>();
        Ok(Self {
            index,
            uniforms,
            instances,
            instance_capacity,
        })
    }

    /// Slot index in the ring
    pub fn index(&self) -> usize {
        self.index
    }

    /// Global uniform region
    pub fn uniforms(&self) -> &M {
        &self.uniforms
    }

    /// Instance array region
    pub fn instances(&self) -> &M {
        &self.instances
    }

    /// Maximum instances the slot can hold
    pub fn instance_capacity(&self) -> usize {
        self.instance_capacity
    }
}

/// Fixed ring of frame slots with a rotating write index
#[derive(Debug)]
pub struct RingBufferSet<M> {
    slots: Vec<FrameSlot<M>>,
    next_slot: usize,
}

impl<M: HostBuffer> RingBufferSet<M> {
    /// Allocate `slot_count` slots through the backend
    pub fn allocate<B>(backend: &mut B, slot_count: usize, instance_capacity: usize) -> RenderResult<Self>
    where
        B: RenderBackend<Memory = M>,
    {
        if instance_capacity == 0 {
            return Err(RenderError::InvalidConfig("instance capacity must be at least 1".to_string()));
        }
        let instance_bytes = instance_capacity * std::mem::size_of::<InstanceData>();
        let slots = (0..slot_count)
            .map(|index| {
                let uniforms = backend.allocate_host_buffer(BufferUsage::Uniform, std::mem::size_of::<GlobalUniforms>())?;
                let instances = backend.allocate_host_buffer(BufferUsage::Instance, instance_bytes)?;
                FrameSlot::new(index, uniforms, instances)
            })
            .collect::<RenderResult<Vec<_>>>()?;

        log::debug!(
            "Allocated {} frame slots ({} instances, {} bytes each)",
            slot_count,
            instance_capacity,
            instance_bytes
        );
        Self::from_slots(slots)
    }

    /// Build a ring from existing slots, indexed in order
    pub fn from_slots(slots: Vec<FrameSlot<M>>) -> RenderResult<Self> {
        if slots.is_empty() {
            return Err(RenderError::InvalidConfig("ring needs at least one slot".to_string()));
        }
        if let Some((position, slot)) = slots.iter().enumerate().find(|(position, slot)| slot.index != *position) {
            return Err(RenderError::InvalidConfig(format!(
                "slot at position {} has index {}",
                position, slot.index
            )));
        }
        Ok(Self { slots, next_slot: 0 })
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false; a ring has at least one slot
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Rotate to the slot for the frame about to be produced
    ///
    /// The first call returns slot 0.
    pub fn advance(&mut self) -> usize {
        let slot = self.next_slot;
        self.next_slot = (self.next_slot + 1) % self.slots.len();
        slot
    }

    /// Borrow a slot
    pub fn slot(&self, index: usize) -> RenderResult<&FrameSlot<M>> {
        self.slots.get(index).ok_or_else(|| out_of_range(index, self.slots.len()))
    }

    /// Overwrite the slot's global uniforms
    pub fn write_global_uniforms(&mut self, index: usize, globals: &GlobalUniforms) -> RenderResult<()> {
        let slot = self.slot_mut(index)?;
        slot.uniforms.write(0, bytemuck::bytes_of(globals))
    }

    /// Overwrite the used prefix of the slot's instance region
    pub fn write_instances(&mut self, index: usize, instances: &[InstanceData]) -> RenderResult<()> {
        let slot = self.slot_mut(index)?;
        if instances.len() > slot.instance_capacity {
            return Err(RenderError::CapacityExceeded {
                requested: instances.len(),
                capacity: slot.instance_capacity,
            });
        }
        if instances.is_empty() {
            return Ok(());
        }
        slot.instances.write(0, bytemuck::cast_slice(instances))
    }

    fn slot_mut(&mut self, index: usize) -> RenderResult<&mut FrameSlot<M>> {
        let count = self.slots.len();
        self.slots.get_mut(index).ok_or_else(|| out_of_range(index, count))
    }
}

fn out_of_range(index: usize, count: usize) -> RenderError {
    RenderError::InvalidConfig(format!("frame slot {} out of range for {} slots", index, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::render_backend::HostMemory;
    use bytemuck::Zeroable;

    fn ring(slot_count: usize, capacity: usize) -> RingBufferSet<HostMemory> {
        let slots = (0..slot_count)
            .map(|index| {
                FrameSlot::new(
                    index,
                    HostMemory::zeroed(std::mem::size_of::<GlobalUniforms>()),
                    HostMemory::zeroed(capacity * std::mem::size_of::<InstanceData>()),
                )
                .unwrap()
            })
            .collect();
        RingBufferSet::from_slots(slots).unwrap()
    }

    fn instance(seed: f32) -> InstanceData {
        InstanceData {
            transform: [[seed; 4]; 4],
            color: [seed, 0.0, 0.0, 1.0],
        }
    }

    #[test]
    fn test_advance_starts_at_zero_and_wraps() {
        let mut ring = ring(3, 4);
        let slots: Vec<usize> = (0..7).map(|_| ring.advance()).collect();
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_write_instances_overwrites_prefix() {
        let mut ring = ring(2, 4);
        ring.write_instances(1, &[instance(1.0), instance(2.0), instance(3.0)]).unwrap();
        ring.write_instances(1, &[instance(9.0)]).unwrap();

        let written: Vec<InstanceData> = ring.slot(1).unwrap().instances().read(3).unwrap();
        assert_eq!(written, vec![instance(9.0), instance(2.0), instance(3.0)]);

        let untouched: Vec<InstanceData> = ring.slot(0).unwrap().instances().read(1).unwrap();
        assert_eq!(untouched[0], InstanceData::zeroed());
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut ring = ring(1, 2);
        let too_many = vec![instance(0.0); 3];

        assert!(matches!(
            ring.write_instances(0, &too_many),
            Err(RenderError::CapacityExceeded { requested: 3, capacity: 2 })
        ));
        assert!(ring.write_instances(0, &too_many[..2]).is_ok());
    }

    #[test]
    fn test_write_globals() {
        let mut ring = ring(3, 1);
        let globals = GlobalUniforms {
            ambient: [0.1, 0.2, 0.3, 0.4],
            ..GlobalUniforms::default()
        };
        ring.write_global_uniforms(2, &globals).unwrap();

        let stored: Vec<GlobalUniforms> = ring.slot(2).unwrap().uniforms().read(1).unwrap();
        assert_eq!(stored[0], globals);
        assert!(ring.write_global_uniforms(3, &globals).is_err());
    }

    #[test]
    fn test_slot_rejects_small_uniform_region() {
        let result = FrameSlot::new(0, HostMemory::zeroed(16), HostMemory::zeroed(80));
        assert!(matches!(result, Err(RenderError::InvalidConfig(_))));
    }
}
