use std::{net::Ipv4Addr, path::Path};

use blackhole_common::{classify::Direction, whitelist::ALLOWED};
use log::{debug, info, warn};

use crate::{datapath::Datapath, error::Error, store::WhitelistStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Attached,
}

/// What the session changed on the interface
#[derive(Debug)]
pub struct InterfaceBinding<E, I> {
    iface: String,
    index: u32,
    egress_link: Option<E>,
    ingress_link: Option<I>,
    created_attachment_point: bool,
}
impl<E, I> InterfaceBinding<E, I> {
    pub fn iface(&self) -> &str {
        &self.iface
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Whether the egress attachment point is ours to destroy
    pub fn created_attachment_point(&self) -> bool {
        self.created_attachment_point
    }
}

type Binding<D> = InterfaceBinding<<D as Datapath>::EgressLink, <D as Datapath>::IngressLink>;

/// Owner of both classifiers and the whitelist on one interface
///
/// Dropping an attached session tears it down.
pub struct Session<D: Datapath> {
    datapath: D,
    state: SessionState,
    binding: Option<Binding<D>>,
    egress_image: Option<D::Image>,
    ingress_image: Option<D::Image>,
    store: Option<D::Store>,
}

impl<D: Datapath> Session<D> {
    pub fn new(datapath: D) -> Self {
        Self {
            datapath,
            state: SessionState::Uninitialized,
            binding: None,
            egress_image: None,
            ingress_image: None,
            store: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn binding(&self) -> Option<&Binding<D>> {
        match self.state {
            SessionState::Attached => self.binding.as_ref(),
            _ => None,
        }
    }

    pub fn datapath(&self) -> &D {
        &self.datapath
    }

    pub fn datapath_mut(&mut self) -> &mut D {
        &mut self.datapath
    }

    /// Attach the egress learner and the ingress classifier to `iface`
    ///
    /// On failure everything done so far is undone before the error returns.
    pub fn init(
        &mut self,
        iface: &str,
        egress_image: &Path,
        ingress_image: &Path,
    ) -> Result<(), Error> {
        if let Some(binding) = self.binding() {
            return Err(Error::AlreadyAttached {
                iface: binding.iface.clone(),
            });
        }
        let index = self
            .datapath
            .interface_index(iface)
            .ok_or_else(|| Error::Config {
                iface: iface.to_owned(),
            })?;

        self.state = SessionState::Initializing;
        match self.attach(iface, index, egress_image, ingress_image) {
            Ok(()) => {
                self.state = SessionState::Attached;
                info!("attached to {iface} (index {index})");
                Ok(())
            }
            Err(e) => {
                warn!("failed to attach to {iface}, rolling back: {e}");
                self.cleanup();
                Err(e)
            }
        }
    }

    fn attach(
        &mut self,
        iface: &str,
        index: u32,
        egress_image: &Path,
        ingress_image: &Path,
    ) -> Result<(), Error> {
        let egress = self
            .egress_image
            .insert(self.datapath.load_image(egress_image, Direction::Egress)?);
        let ingress = self
            .ingress_image
            .insert(self.datapath.load_image(ingress_image, Direction::Ingress)?);

        let created_attachment_point = self.datapath.create_egress_point(iface)?;
        if !created_attachment_point {
            debug!("reusing the egress attachment point on {iface}");
        }
        let binding = self.binding.insert(InterfaceBinding {
            iface: iface.to_owned(),
            index,
            egress_link: None,
            ingress_link: None,
            created_attachment_point,
        });

        binding.egress_link = Some(self.datapath.attach_egress(egress, iface)?);
        binding.ingress_link = Some(self.datapath.attach_ingress(ingress, iface)?);

        // Both images declare the same pinned map, either one will do
        let store = match self.datapath.take_store(ingress) {
            Ok(store) => store,
            Err(e) => {
                debug!("whitelist not in the ingress image: {e}");
                self.datapath.take_store(egress)?
            }
        };
        self.store = Some(store);
        Ok(())
    }

    /// Undo everything `init` did
    ///
    /// Every step runs even if an earlier one fails; failures are only
    /// logged. Calling it again, or before `init`, does nothing.
    pub fn cleanup(&mut self) {
        if let Some(mut store) = self.store.take() {
            match store.clear_all() {
                Ok(removed) => debug!("cleared {removed} whitelist entries"),
                Err(e) => warn!("failed to clear whitelist: {e}"),
            }
        }

        if let Some(mut binding) = self.binding.take() {
            let iface = binding.iface.as_str();
            let ingress = (binding.ingress_link.take(), self.ingress_image.as_mut());
            if let (Some(link), Some(image)) = ingress {
                if let Err(e) = self.datapath.detach_ingress(image, iface, link) {
                    warn!("{e}");
                }
            }
            let egress = (binding.egress_link.take(), self.egress_image.as_mut());
            if let (Some(link), Some(image)) = egress {
                if let Err(e) = self.datapath.detach_egress(image, iface, link) {
                    warn!("{e}");
                }
            }
            if binding.created_attachment_point {
                if let Err(e) = self.datapath.destroy_egress_point(iface) {
                    warn!("{e}");
                }
            }
            info!("detached from {iface}");
        }

        if let Some(image) = self.ingress_image.take() {
            self.datapath.release_image(image);
        }
        if let Some(image) = self.egress_image.take() {
            self.datapath.release_image(image);
        }
        self.state = SessionState::Uninitialized;
    }

    /// Whitelist a dotted-decimal IPv4 address
    pub fn add(&mut self, ip: &str) -> Result<Ipv4Addr, Error> {
        let addr: Ipv4Addr = ip.parse().map_err(|source| Error::Validation {
            input: ip.to_owned(),
            source,
        })?;
        let store = self.store.as_mut().ok_or(Error::NotReady)?;
        store.upsert(addr, ALLOWED)?;
        Ok(addr)
    }

    /// Remove every whitelisted address, learned or added
    pub fn clear(&mut self) -> Result<usize, Error> {
        let store = self.store.as_mut().ok_or(Error::NotReady)?;
        Ok(store.clear_all()?)
    }

    pub fn lookup(&self, ip: Ipv4Addr) -> Result<Option<u8>, Error> {
        let store = self.store.as_ref().ok_or(Error::NotReady)?;
        Ok(store.lookup(ip)?)
    }

    pub fn list(&self) -> Result<Vec<Ipv4Addr>, Error> {
        let store = self.store.as_ref().ok_or(Error::NotReady)?;
        let mut ips = store.keys()?;
        ips.sort();
        Ok(ips)
    }

    /// Add each address, returning the ones that failed
    pub fn seed<S: AsRef<str>>(&mut self, ips: &[S]) -> Vec<(String, Error)> {
        let mut failed = Vec::new();
        for ip in ips {
            let ip = ip.as_ref();
            match self.add(ip) {
                Ok(addr) => info!("Added {addr} to whitelist"),
                Err(e) => {
                    warn!("Failed to add {ip:?} to whitelist: {e}");
                    failed.push((ip.to_owned(), e));
                }
            }
        }
        failed
    }
}

impl<D: Datapath> Drop for Session<D> {
    fn drop(&mut self) {
        if self.state != SessionState::Uninitialized {
            self.cleanup();
        }
    }
}
