//! Delivery Queue
//!
//! Pending delivery tasks, one FIFO per device. Only the head of a device's
//! FIFO is ever eligible, so a device's observations go out in submission
//! order. The head that became eligible first goes next; devices whose heads
//! became eligible at the same instant take turns.

use std::collections::{HashMap, VecDeque};

use tokio::time::Instant;

use super::types::{DeliveryState, DeliveryTask};

#[derive(Debug, Default)]
pub struct DeliveryQueue {
    devices: HashMap<String, VecDeque<DeliveryTask>>,
    device_order: VecDeque<String>,
    /// Drop-oldest bound; `None` is unbounded
    capacity: Option<usize>,
    len: usize,
}

impl DeliveryQueue {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Append a task behind the device's other tasks.
    /// Returns the oldest task if the bound was exceeded and it was dropped.
    pub fn push(&mut self, task: DeliveryTask) -> Option<DeliveryTask> {
        let device_id = task.device_id().to_string();
        if !self.devices.contains_key(&device_id) {
            self.device_order.push_back(device_id.clone());
        }
        self.devices.entry(device_id).or_default().push_back(task);
        self.len += 1;

        match self.capacity {
            Some(capacity) if self.len > capacity => self.remove_oldest(),
            _ => None,
        }
    }

    /// Put a task back at the head of its device's FIFO
    pub fn requeue(&mut self, mut task: DeliveryTask) {
        task.state = DeliveryState::Pending;
        let device_id = task.device_id().to_string();
        if !self.devices.contains_key(&device_id) {
            self.device_order.push_back(device_id.clone());
        }
        self.devices.entry(device_id).or_default().push_front(task);
        self.len += 1;
    }

    /// Take the ready head with the earliest eligibility; ties go to the
    /// device that has waited longest in the rotation.
    pub fn pop_ready(&mut self, now: Instant) -> Option<DeliveryTask> {
        let (position, _) = self
            .device_order
            .iter()
            .enumerate()
            .filter_map(|(position, device)| {
                let head = self.devices.get(device)?.front()?;
                (head.next_eligible_at <= now).then_some((position, head.next_eligible_at))
            })
            .min_by_key(|(position, eligible_at)| (*eligible_at, *position))?;

        let device = self.device_order.remove(position)?;
        let queue = self.devices.get_mut(&device)?;
        let task = queue.pop_front();

        if queue.is_empty() {
            self.devices.remove(&device);
        } else {
            self.device_order.push_back(device);
        }

        if task.is_some() {
            self.len -= 1;
        }
        task
    }

    /// Earliest moment any head becomes eligible
    pub fn next_eligible_at(&self) -> Option<Instant> {
        self.devices
            .values()
            .filter_map(|queue| queue.front())
            .map(|task| task.next_eligible_at)
            .min()
    }

    /// Remove everything, oldest first per device
    pub fn drain(&mut self) -> Vec<DeliveryTask> {
        let mut tasks = Vec::with_capacity(self.len);
        for device in self.device_order.drain(..) {
            if let Some(queue) = self.devices.remove(&device) {
                tasks.extend(queue);
            }
        }
        self.len = 0;
        tasks
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn remove_oldest(&mut self) -> Option<DeliveryTask> {
        let device = self
            .devices
            .iter()
            .filter_map(|(device, queue)| queue.front().map(|task| (device, task.id)))
            .min_by_key(|(_, id)| *id)
            .map(|(device, _)| device.clone())?;

        let queue = self.devices.get_mut(&device)?;
        let task = queue.pop_front();
        if queue.is_empty() {
            self.devices.remove(&device);
            self.device_order.retain(|d| d != &device);
        }
        if task.is_some() {
            self.len -= 1;
        }
        task
    }
}
