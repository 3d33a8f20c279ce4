use std::path::Path;

use blackhole_common::classify::Direction;

use crate::{error::Error, store::WhitelistStore};

/// Kernel-facing operations the session drives
///
/// Every call that changes the interface returns a handle the session keeps
/// until it undoes that change.
pub trait Datapath: Send {
    /// A loaded classifier image
    type Image: Send;
    type EgressLink: Send;
    type IngressLink: Send;
    type Store: WhitelistStore + Send;

    fn interface_index(&self, iface: &str) -> Option<u32>;

    /// Load the image at `path` and its `hook` program into the kernel
    fn load_image(&mut self, path: &Path, hook: Direction) -> Result<Self::Image, Error>;
    fn release_image(&mut self, image: Self::Image);

    /// Make sure `iface` has an egress attachment point
    ///
    /// Returns `true` only if this call created it; one that already existed
    /// may belong to other software.
    fn create_egress_point(&mut self, iface: &str) -> Result<bool, Error>;
    fn destroy_egress_point(&mut self, iface: &str) -> Result<(), Error>;

    fn attach_egress(
        &mut self,
        image: &mut Self::Image,
        iface: &str,
    ) -> Result<Self::EgressLink, Error>;
    fn attach_ingress(
        &mut self,
        image: &mut Self::Image,
        iface: &str,
    ) -> Result<Self::IngressLink, Error>;
    fn detach_egress(
        &mut self,
        image: &mut Self::Image,
        iface: &str,
        link: Self::EgressLink,
    ) -> Result<(), Error>;
    fn detach_ingress(
        &mut self,
        image: &mut Self::Image,
        iface: &str,
        link: Self::IngressLink,
    ) -> Result<(), Error>;

    /// Take the whitelist handle out of a loaded image
    fn take_store(&mut self, image: &mut Self::Image) -> Result<Self::Store, Error>;
}
