#![no_std]
#![no_main]

use aya_ebpf::{bindings::TC_ACT_OK, macros::classifier, programs::TcContext};
use aya_log_ebpf::info;
use blackhole_common::{
    classify::{self, Egress, EGRESS_LEARNED},
    frame::Frame,
};
use blackhole_ebpf::KernelWhitelist;

#[classifier]
pub fn blackhole_egress(ctx: TcContext) -> i32 {
    let frame = unsafe { Frame::from_raw(ctx.data(), ctx.data_end()) };
    if let Egress::Learned(dst) = classify::egress(&frame, &KernelWhitelist) {
        let [before, after] = EGRESS_LEARNED;
        info!(&ctx, "{}{:i}{}", before, dst, after);
    }
    TC_ACT_OK
}

#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 4] = *b"GPL\0";
