//! In-memory `Datapath` that records every call and fails on demand

use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use blackhole_common::{classify::Direction, whitelist::WHITELIST_MAP};

use crate::{datapath::Datapath, error::Error, store::ShardedWhitelist};

/// A call that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Load(Direction),
    CreateEgressPoint,
    DestroyEgressPoint,
    AttachEgress,
    AttachIngress,
    DetachEgress,
    DetachIngress,
    TakeStore(Direction),
}

/// A call that was made, whether it failed or not
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Load(Direction),
    Release(Direction),
    CreateEgressPoint,
    DestroyEgressPoint,
    AttachEgress,
    AttachIngress,
    DetachEgress,
    DetachIngress,
    TakeStore(Direction),
}

#[derive(Debug, Default)]
struct State {
    events: Vec<Event>,
    failing: Vec<Step>,
    live_images: usize,
    egress_point: bool,
    egress_attached: bool,
    ingress_attached: bool,
    next_link: u32,
}

#[derive(Debug)]
pub struct FakeImage {
    hook: Direction,
}

/// Clones observe the same interface
#[derive(Debug, Clone)]
pub struct FakeDatapath {
    iface: String,
    index: u32,
    state: Arc<Mutex<State>>,
    pinned: ShardedWhitelist,
}
impl FakeDatapath {
    pub fn with_interface(iface: &str, index: u32) -> Self {
        Self {
            iface: iface.to_owned(),
            index,
            state: Arc::default(),
            pinned: ShardedWhitelist::with_capacity(16),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fail(&mut self, step: Step) {
        self.state().failing.push(step);
    }

    pub fn heal(&mut self) {
        self.state().failing.clear();
    }

    pub fn preexisting_egress_point(&mut self) {
        self.state().egress_point = true;
    }

    /// Handle that outlives the session owning this datapath
    pub fn probe(&self) -> Self {
        self.clone()
    }

    /// The table the packet path sees
    pub fn pinned(&self) -> ShardedWhitelist {
        self.pinned.clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    pub fn live_images(&self) -> usize {
        self.state().live_images
    }

    pub fn egress_point_exists(&self) -> bool {
        self.state().egress_point
    }

    pub fn egress_attached(&self) -> bool {
        self.state().egress_attached
    }

    pub fn ingress_attached(&self) -> bool {
        self.state().ingress_attached
    }

    /// Record `event`, then fail if `step` was asked to
    fn call(&self, event: Event, step: Step) -> Result<MutexGuard<'_, State>, String> {
        let mut state = self.state();
        state.events.push(event);
        if state.failing.contains(&step) {
            return Err(format!("injected failure at {step:?}"));
        }
        Ok(state)
    }
}

impl Datapath for FakeDatapath {
    type Image = FakeImage;
    type EgressLink = u32;
    type IngressLink = u32;
    type Store = ShardedWhitelist;

    fn interface_index(&self, iface: &str) -> Option<u32> {
        (iface == self.iface).then_some(self.index)
    }

    fn load_image(&mut self, path: &Path, hook: Direction) -> Result<FakeImage, Error> {
        let mut state = self
            .call(Event::Load(hook), Step::Load(hook))
            .map_err(|e| Error::Load {
                path: path.to_owned(),
                source: e.into(),
            })?;
        state.live_images += 1;
        Ok(FakeImage { hook })
    }

    fn release_image(&mut self, image: FakeImage) {
        let mut state = self.state();
        state.events.push(Event::Release(image.hook));
        state.live_images -= 1;
    }

    fn create_egress_point(&mut self, iface: &str) -> Result<bool, Error> {
        let mut state = self
            .call(Event::CreateEgressPoint, Step::CreateEgressPoint)
            .map_err(|e| Error::Attach {
                hook: Direction::Egress,
                iface: iface.to_owned(),
                source: e.into(),
            })?;
        let created = !state.egress_point;
        state.egress_point = true;
        Ok(created)
    }

    fn destroy_egress_point(&mut self, iface: &str) -> Result<(), Error> {
        let mut state = self
            .call(Event::DestroyEgressPoint, Step::DestroyEgressPoint)
            .map_err(|e| Error::Detach {
                hook: Direction::Egress,
                iface: iface.to_owned(),
                source: e.into(),
            })?;
        state.egress_point = false;
        Ok(())
    }

    fn attach_egress(&mut self, _image: &mut FakeImage, iface: &str) -> Result<u32, Error> {
        let mut state = self
            .call(Event::AttachEgress, Step::AttachEgress)
            .map_err(|e| Error::Attach {
                hook: Direction::Egress,
                iface: iface.to_owned(),
                source: e.into(),
            })?;
        state.egress_attached = true;
        state.next_link += 1;
        Ok(state.next_link)
    }

    fn attach_ingress(&mut self, _image: &mut FakeImage, iface: &str) -> Result<u32, Error> {
        let mut state = self
            .call(Event::AttachIngress, Step::AttachIngress)
            .map_err(|e| Error::Attach {
                hook: Direction::Ingress,
                iface: iface.to_owned(),
                source: e.into(),
            })?;
        state.ingress_attached = true;
        state.next_link += 1;
        Ok(state.next_link)
    }

    fn detach_egress(
        &mut self,
        _image: &mut FakeImage,
        iface: &str,
        _link: u32,
    ) -> Result<(), Error> {
        let mut state = self
            .call(Event::DetachEgress, Step::DetachEgress)
            .map_err(|e| Error::Detach {
                hook: Direction::Egress,
                iface: iface.to_owned(),
                source: e.into(),
            })?;
        state.egress_attached = false;
        Ok(())
    }

    fn detach_ingress(
        &mut self,
        _image: &mut FakeImage,
        iface: &str,
        _link: u32,
    ) -> Result<(), Error> {
        let mut state = self
            .call(Event::DetachIngress, Step::DetachIngress)
            .map_err(|e| Error::Detach {
                hook: Direction::Ingress,
                iface: iface.to_owned(),
                source: e.into(),
            })?;
        state.ingress_attached = false;
        Ok(())
    }

    fn take_store(&mut self, image: &mut FakeImage) -> Result<ShardedWhitelist, Error> {
        let state = self
            .call(Event::TakeStore(image.hook), Step::TakeStore(image.hook))
            .map_err(|e| Error::Map {
                name: WHITELIST_MAP,
                source: e.into(),
            })?;
        drop(state);
        Ok(self.pinned.clone())
    }
}

/// Ethernet + minimal IPv4 header
pub fn ipv4_frame(src: [u8; 4], dst: [u8; 4]) -> Vec<u8> {
    let mut frame = vec![0_u8; 34];
    frame[12..14].copy_from_slice(&[0x08, 0x00]);
    frame[14] = 0x45;
    frame[16..18].copy_from_slice(&20_u16.to_be_bytes());
    frame[22] = 64;
    frame[23] = 17;
    frame[26..30].copy_from_slice(&src);
    frame[30..34].copy_from_slice(&dst);
    frame
}
