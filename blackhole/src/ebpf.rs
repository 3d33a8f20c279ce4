use std::{
    ffi::CString,
    fs, io,
    path::{Path, PathBuf},
    process::Command,
};

use aya::{
    programs::{
        tc::{self, SchedClassifierLinkId},
        xdp::XdpLinkId,
        SchedClassifier, TcAttachType, Xdp, XdpFlags,
    },
    Ebpf, EbpfLoader,
};
use blackhole_common::{
    classify::{Direction, EGRESS_PROGRAM, INGRESS_PROGRAM},
    whitelist::WHITELIST_MAP,
};
use clap::ValueEnum;
use log::{debug, warn};

use crate::{
    datapath::Datapath,
    error::{BoxError, Error},
    store::KernelWhitelist,
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum XdpMode {
    /// Let the kernel pick
    #[default]
    Default,
    Skb,
    Driver,
    Hw,
}
impl From<XdpMode> for XdpFlags {
    fn from(mode: XdpMode) -> Self {
        match mode {
            XdpMode::Default => XdpFlags::default(),
            XdpMode::Skb => XdpFlags::SKB_MODE,
            XdpMode::Driver => XdpFlags::DRV_MODE,
            XdpMode::Hw => XdpFlags::HW_MODE,
        }
    }
}

/// XDP ingress plus clsact egress through aya
///
/// Images are loaded with `pin_path` as their bpffs directory, so the
/// `WHITELIST` map both declare is created by the first load and reused by
/// the second.
pub struct AyaDatapath {
    pin_path: PathBuf,
    xdp_flags: XdpFlags,
}
impl AyaDatapath {
    pub fn new(pin_path: impl Into<PathBuf>, xdp_flags: XdpFlags) -> Self {
        Self {
            pin_path: pin_path.into(),
            xdp_flags,
        }
    }
}

impl Datapath for AyaDatapath {
    type Image = Ebpf;
    type EgressLink = SchedClassifierLinkId;
    type IngressLink = XdpLinkId;
    type Store = KernelWhitelist;

    fn interface_index(&self, iface: &str) -> Option<u32> {
        let name = CString::new(iface).ok()?;
        let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
        (index != 0).then_some(index)
    }

    fn load_image(&mut self, path: &Path, hook: Direction) -> Result<Ebpf, Error> {
        let load_err = |source: BoxError| Error::Load {
            path: path.to_owned(),
            source,
        };

        fs::create_dir_all(&self.pin_path).map_err(|e| load_err(e.into()))?;
        let mut bpf = EbpfLoader::new()
            .map_pin_path(&self.pin_path)
            .load_file(path)
            .map_err(|e| load_err(e.into()))?;
        if let Err(e) = aya_log::EbpfLogger::init(&mut bpf) {
            warn!("failed to initialize eBPF logger for {}: {e}", path.display());
        }

        match hook {
            Direction::Egress => {
                let program: &mut SchedClassifier = bpf
                    .program_mut(EGRESS_PROGRAM)
                    .ok_or_else(|| load_err(format!("program {EGRESS_PROGRAM} not found").into()))?
                    .try_into()
                    .map_err(|e: aya::programs::ProgramError| load_err(e.into()))?;
                program.load().map_err(|e| load_err(e.into()))?;
            }
            Direction::Ingress => {
                let program: &mut Xdp = bpf
                    .program_mut(INGRESS_PROGRAM)
                    .ok_or_else(|| load_err(format!("program {INGRESS_PROGRAM} not found").into()))?
                    .try_into()
                    .map_err(|e: aya::programs::ProgramError| load_err(e.into()))?;
                program.load().map_err(|e| load_err(e.into()))?;
            }
        }
        debug!("loaded {hook} image {}", path.display());
        Ok(bpf)
    }

    fn release_image(&mut self, image: Ebpf) {
        drop(image);
    }

    fn create_egress_point(&mut self, iface: &str) -> Result<bool, Error> {
        match tc::qdisc_add_clsact(iface) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(Error::Attach {
                hook: Direction::Egress,
                iface: iface.to_owned(),
                source: e.into(),
            }),
        }
    }

    fn destroy_egress_point(&mut self, iface: &str) -> Result<(), Error> {
        let detach_err = |source: BoxError| Error::Detach {
            hook: Direction::Egress,
            iface: iface.to_owned(),
            source,
        };
        // aya can add a clsact qdisc but not delete one
        let status = Command::new("tc")
            .args(["qdisc", "del", "dev", iface, "clsact"])
            .status()
            .map_err(|e| detach_err(e.into()))?;
        if !status.success() {
            return Err(detach_err(format!("tc qdisc del exited with {status}").into()));
        }
        Ok(())
    }

    fn attach_egress(
        &mut self,
        image: &mut Ebpf,
        iface: &str,
    ) -> Result<SchedClassifierLinkId, Error> {
        let attach_err = |source: BoxError| Error::Attach {
            hook: Direction::Egress,
            iface: iface.to_owned(),
            source,
        };
        let program: &mut SchedClassifier = image
            .program_mut(EGRESS_PROGRAM)
            .ok_or_else(|| attach_err(format!("program {EGRESS_PROGRAM} not found").into()))?
            .try_into()
            .map_err(|e: aya::programs::ProgramError| attach_err(e.into()))?;
        program
            .attach(iface, TcAttachType::Egress)
            .map_err(|e| attach_err(e.into()))
    }

    fn attach_ingress(&mut self, image: &mut Ebpf, iface: &str) -> Result<XdpLinkId, Error> {
        let attach_err = |source: BoxError| Error::Attach {
            hook: Direction::Ingress,
            iface: iface.to_owned(),
            source,
        };
        let program: &mut Xdp = image
            .program_mut(INGRESS_PROGRAM)
            .ok_or_else(|| attach_err(format!("program {INGRESS_PROGRAM} not found").into()))?
            .try_into()
            .map_err(|e: aya::programs::ProgramError| attach_err(e.into()))?;
        program
            .attach(iface, self.xdp_flags)
            .map_err(|e| attach_err(e.into()))
    }

    fn detach_egress(
        &mut self,
        image: &mut Ebpf,
        iface: &str,
        link: SchedClassifierLinkId,
    ) -> Result<(), Error> {
        let detach_err = |source: BoxError| Error::Detach {
            hook: Direction::Egress,
            iface: iface.to_owned(),
            source,
        };
        let program: &mut SchedClassifier = image
            .program_mut(EGRESS_PROGRAM)
            .ok_or_else(|| detach_err(format!("program {EGRESS_PROGRAM} not found").into()))?
            .try_into()
            .map_err(|e: aya::programs::ProgramError| detach_err(e.into()))?;
        program.detach(link).map_err(|e| detach_err(e.into()))
    }

    fn detach_ingress(
        &mut self,
        image: &mut Ebpf,
        iface: &str,
        link: XdpLinkId,
    ) -> Result<(), Error> {
        let detach_err = |source: BoxError| Error::Detach {
            hook: Direction::Ingress,
            iface: iface.to_owned(),
            source,
        };
        let program: &mut Xdp = image
            .program_mut(INGRESS_PROGRAM)
            .ok_or_else(|| detach_err(format!("program {INGRESS_PROGRAM} not found").into()))?
            .try_into()
            .map_err(|e: aya::programs::ProgramError| detach_err(e.into()))?;
        program.detach(link).map_err(|e| detach_err(e.into()))
    }

    fn take_store(&mut self, image: &mut Ebpf) -> Result<KernelWhitelist, Error> {
        let map_err = |source: BoxError| Error::Map {
            name: WHITELIST_MAP,
            source,
        };
        let map = image
            .take_map(WHITELIST_MAP)
            .ok_or_else(|| map_err("map not found in image".into()))?;
        KernelWhitelist::try_bind(map).map_err(|e| map_err(e.into()))
    }
}
