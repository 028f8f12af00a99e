//! MMIO devices driven from guest code through the ordinary load/store
//! path.

use std::cell::RefCell;
use std::rc::Rc;

use rv32_emulator::{Core, Memory, MmioDevice, MmioRegion, Region};
use rv32_encoder::*;

const CONSOLE_BASE: u64 = 0x10000;

/// Byte-wide output console: writes to offset 0 append to a buffer,
/// reads from offset 4 return the number of bytes written so far.
struct Console {
    output: Rc<RefCell<Vec<u8>>>,
}

impl MmioDevice for Console {
    fn read(&mut self, offset: u64, size: u64) -> Vec<u8> {
        let mut reply = vec![0; size as usize];
        if offset == 4 {
            let count = self.output.borrow().len() as u32;
            let bytes = count.to_le_bytes();
            let n = reply.len().min(bytes.len());
            reply[..n].copy_from_slice(&bytes[..n]);
        }
        reply
    }

    fn write(&mut self, offset: u64, data: &[u8]) {
        if offset == 0 {
            self.output.borrow_mut().extend_from_slice(data);
        }
    }
}

fn console_core() -> (Core, Rc<RefCell<Vec<u8>>>) {
    let output = Rc::new(RefCell::new(Vec::new()));
    let mut mem = Memory::new(0, 0x1000000, 2048).unwrap();
    mem.add_region(Region::Mmio(MmioRegion::new(
        CONSOLE_BASE,
        8,
        "console",
        Box::new(Console {
            output: Rc::clone(&output),
        }),
    )))
    .unwrap();
    (Core::rv32i(mem), output)
}

fn stage(core: &mut Core, words: &[u32]) {
    for (i, word) in words.iter().enumerate() {
        core.memory_mut()
            .write(i as u64 * 4, 4, &word.to_le_bytes())
            .unwrap();
    }
}

#[test]
fn test_guest_stores_reach_the_device() {
    let (mut core, output) = console_core();
    stage(
        &mut core,
        &[
            lui(Gpr::A0, 0x10), // a0 = 0x10000
            addi(Gpr::A1, Gpr::ZERO, b'H' as i32),
            sb(Gpr::A0, Gpr::A1, 0),
            addi(Gpr::A1, Gpr::ZERO, b'i' as i32),
            sb(Gpr::A0, Gpr::A1, 0),
            ebreak(),
        ],
    );
    core.run_until_ebreak().unwrap();
    assert_eq!(output.borrow().as_slice(), b"Hi");
}

#[test]
fn test_guest_loads_observe_device_state() {
    let (mut core, _output) = console_core();
    stage(
        &mut core,
        &[
            lui(Gpr::A0, 0x10),
            addi(Gpr::A1, Gpr::ZERO, b'!' as i32),
            sb(Gpr::A0, Gpr::A1, 0),
            sb(Gpr::A0, Gpr::A1, 0),
            sb(Gpr::A0, Gpr::A1, 0),
            lw(Gpr::A2, Gpr::A0, 4), // read the byte counter
            ebreak(),
        ],
    );
    core.run_until_ebreak().unwrap();
    assert_eq!(core.register_value(Gpr::A2).unwrap(), 3);
}

#[test]
fn test_host_writes_share_the_device_path() {
    // The ELF-loader path and the guest path drive the same region.
    let (mut core, output) = console_core();
    core.memory_mut()
        .write(CONSOLE_BASE, 1, &[b'>'])
        .unwrap();
    assert_eq!(output.borrow().as_slice(), b">");
}
