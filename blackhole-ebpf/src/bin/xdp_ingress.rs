#![no_std]
#![no_main]

use aya_ebpf::{bindings::xdp_action, macros::xdp, programs::XdpContext};
use aya_log_ebpf::info;
use blackhole_common::{
    classify::{self, Ingress, INGRESS_DROP},
    frame::Frame,
};
use blackhole_ebpf::KernelWhitelist;

#[xdp]
pub fn blackhole_ingress(ctx: XdpContext) -> u32 {
    let frame = unsafe { Frame::from_raw(ctx.data(), ctx.data_end()) };
    match classify::ingress(&frame, &KernelWhitelist) {
        Ingress::Unfiltered | Ingress::Allow(_) => xdp_action::XDP_PASS,
        Ingress::Drop(src) => {
            info!(&ctx, "{}{:i}", INGRESS_DROP, src);
            xdp_action::XDP_DROP
        }
    }
}

#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 4] = *b"GPL\0";
