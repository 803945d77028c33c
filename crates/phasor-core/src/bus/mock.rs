use crate::bus::BusDriver;
use crate::cpu::Cpu;

/// The lines observed during one cycle. `data` is the byte transferred, or
/// `None` for internal cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CycleRecord {
    pub addr: u32,
    pub data: Option<u8>,
    pub vda: bool,
    pub vpa: bool,
    pub vp: bool,
    pub rwb: bool,
}

/// Flat-RAM driver that services one directive per call and records every
/// cycle for assertion.
pub(crate) struct MockDriver {
    ram: Vec<u8>,
    pub records: Vec<CycleRecord>,

    pending: bool,
    addr: u32,
    in_data: u8,
    out_data: u8,
    r: bool,
    w: bool,
    vda: bool,
    vpa: bool,
    vec_pull: bool,

    pub irq_line: bool,
    nmi_latch: bool,
}

impl std::fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDriver")
            .field("records", &self.records.len())
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self {
            ram: vec![0; 1 << 24],
            records: Vec::new(),
            pending: false,
            addr: 0,
            in_data: 0,
            out_data: 0,
            r: false,
            w: false,
            vda: false,
            vpa: false,
            vec_pull: false,
            irq_line: false,
            nmi_latch: false,
        }
    }
}

impl MockDriver {
    pub fn load(&mut self, addr: u32, bytes: &[u8]) {
        let addr = addr as usize;
        self.ram[addr..addr + bytes.len()].copy_from_slice(bytes);
    }

    pub fn peek(&self, addr: u32) -> u8 {
        self.ram[addr as usize]
    }

    pub fn raise_nmi(&mut self) {
        self.nmi_latch = true;
    }

    /// Run one CPU tick, then service the directive it posted: reads with a
    /// qualifier asserted come from RAM, writes land in RAM only when the
    /// address is marked valid.
    pub fn step(&mut self, cpu: &mut Cpu) {
        self.pending = false;
        cpu.tick(self);
        assert!(self.pending, "tick ended without a bus directive");

        let mut data = None;
        if self.r && (self.vda || self.vpa || self.vec_pull) {
            self.in_data = self.ram[self.addr as usize];
            data = Some(self.in_data);
        } else if self.w {
            data = Some(self.out_data);
            if self.vda {
                self.ram[self.addr as usize] = self.out_data;
            }
        }

        self.records.push(CycleRecord {
            addr: self.addr,
            data,
            vda: self.vda,
            vpa: self.vpa,
            vp: self.vec_pull,
            rwb: self.r,
        });
    }

    pub fn step_n(&mut self, cpu: &mut Cpu, n: usize) {
        for _ in 0..n {
            self.step(cpu);
        }
    }
}

impl BusDriver for MockDriver {
    fn initiate_read(&mut self, addr: u32, vda: bool, vpa: bool, vec_pull: bool) {
        assert!(!self.pending);
        self.addr = addr;
        self.r = true;
        self.w = false;
        self.vda = vda;
        self.vpa = vpa;
        self.vec_pull = vec_pull;
        self.pending = true;
    }

    fn initiate_write(&mut self, addr: u32, data: u8) {
        assert!(!self.pending);
        self.addr = addr;
        self.r = false;
        self.w = true;
        self.out_data = data;
        self.vda = true;
        self.vpa = false;
        self.vec_pull = false;
        self.pending = true;
    }

    fn initiate_stall_at(&mut self, addr: u32, rwb: bool) {
        assert!(!self.pending);
        self.addr = addr;
        self.r = rwb;
        self.w = !rwb;
        self.vda = false;
        self.vpa = false;
        self.vec_pull = false;
        self.pending = true;
    }

    fn initiate_stall_idle(&mut self) {
        assert!(!self.pending);
        self.vda = false;
        self.vpa = false;
        self.vec_pull = false;
        self.pending = true;
    }

    fn initiate_stall_idle_rwb(&mut self, rwb: bool) {
        assert!(!self.pending);
        if !rwb && self.r {
            self.out_data = self.in_data;
        }
        self.r = rwb;
        self.w = !rwb;
        self.vda = false;
        self.vpa = false;
        self.vec_pull = false;
        self.pending = true;
    }

    fn transitive_addr(&mut self, addr: u32) {
        self.addr = addr;
    }

    fn read_data(&self) -> u8 {
        self.in_data
    }

    fn irq(&self) -> bool {
        self.irq_line
    }

    fn nmi(&mut self) -> bool {
        std::mem::take(&mut self.nmi_latch)
    }
}
