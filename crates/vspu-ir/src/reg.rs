//! The special-register catalog and its hazard groups.
//!
//! Every fixed-latency hazard the scheduler knows about is keyed on one of
//! these registers. The group membership below is the single source of the
//! hazard rules; the candidate search and the read-after-write splitter both
//! consult it instead of re-deriving register relationships.

/// Direction of a memory-transfer-bus access.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum BusDirection {
    /// Device memory into the processor.
    Read,
    /// Processor into device memory.
    Write,
}

/// The hazard group a special register belongs to.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum HazardGroup {
    /// The special-function unit: four request registers sharing one result
    /// register. Only one request may be in flight.
    SpecialFunction,
    /// The texture unit address registers. Results arrive in the shared SFU
    /// result register, so the two groups exclude each other.
    Texture,
    /// The memory-transfer bus, read direction.
    BusRead,
    /// The memory-transfer bus, write direction.
    BusWrite,
    /// The hardware mutex delimiting critical sections.
    Mutex,
}

/// A hardware-named storage location with fixed semantics.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Register {
    /// SFU request: reciprocal.
    SfuRecip,
    /// SFU request: reciprocal square root.
    SfuRecipSqrt,
    /// SFU request: base-2 exponential.
    SfuExp2,
    /// SFU request: base-2 logarithm.
    SfuLog2,
    /// Shared result register for SFU and TMU responses.
    SfuResult,
    /// Texture unit 0 lookup address.
    Tmu0Address,
    /// Texture unit 1 lookup address.
    Tmu1Address,
    /// Bus configuration, read direction.
    BusReadSetup,
    /// Bus configuration, write direction.
    BusWriteSetup,
    /// Bus transfer start address, read direction.
    BusReadAddr,
    /// Bus transfer start address, write direction.
    BusWriteAddr,
    /// Busy/stall status, read direction.
    BusReadBusy,
    /// Busy/stall status, write direction.
    BusWriteBusy,
    /// The shared bus data port (both directions).
    BusData,
    /// Reading acquires the hardware mutex, writing releases it.
    Mutex,
    /// Per-kernel uniform value stream; reading advances the stream.
    Uniform,
    /// Write-only sink; results written here are discarded.
    Discard,
}

impl Register {
    /// The hazard group this register belongs to, if any.
    pub fn hazard_group(self) -> Option<HazardGroup> {
        match self {
            Self::SfuRecip | Self::SfuRecipSqrt | Self::SfuExp2 | Self::SfuLog2
            | Self::SfuResult => Some(HazardGroup::SpecialFunction),
            Self::Tmu0Address | Self::Tmu1Address => Some(HazardGroup::Texture),
            Self::BusReadSetup | Self::BusReadAddr | Self::BusReadBusy => {
                Some(HazardGroup::BusRead)
            }
            Self::BusWriteSetup | Self::BusWriteAddr | Self::BusWriteBusy => {
                Some(HazardGroup::BusWrite)
            }
            Self::BusData => Some(HazardGroup::BusRead), // shared port; see bus_companions
            Self::Mutex => Some(HazardGroup::Mutex),
            Self::Uniform | Self::Discard => None,
        }
    }

    /// Returns `true` for the four SFU request registers.
    pub fn is_sfu_call(self) -> bool {
        matches!(
            self,
            Self::SfuRecip | Self::SfuRecipSqrt | Self::SfuExp2 | Self::SfuLog2
        )
    }

    /// Returns `true` if writing this register triggers a unit with latency
    /// coupled to other registers (SFU, TMU, or bus hazards).
    pub fn triggers_unit_hazard(self) -> bool {
        self.is_sfu_call() || matches!(self, Self::Tmu0Address | Self::Tmu1Address)
    }

    /// Returns `true` if reading this register consumes state (uniform
    /// stream, bus FIFO, mutex acquisition). Such reads must never be
    /// duplicated or dropped.
    pub fn read_consumes_state(self) -> bool {
        matches!(self, Self::Uniform | Self::BusData | Self::Mutex)
    }

    /// The full SFU/TMU exclusion group: all four request registers, the
    /// shared result register, and both texture address registers. Any
    /// access to one of these while an SFU or TMU operation is in flight is
    /// unsafe.
    pub fn sfu_tmu_group() -> &'static [Register] {
        &[
            Self::SfuRecip,
            Self::SfuRecipSqrt,
            Self::SfuExp2,
            Self::SfuLog2,
            Self::SfuResult,
            Self::Tmu0Address,
            Self::Tmu1Address,
        ]
    }

    /// The registers whose timing is coupled to the bus address register of
    /// the given direction: the direction's busy register and the shared
    /// data port.
    pub fn bus_companions(direction: BusDirection) -> [Register; 2] {
        match direction {
            BusDirection::Read => [Self::BusReadBusy, Self::BusData],
            BusDirection::Write => [Self::BusWriteBusy, Self::BusData],
        }
    }

    /// If this is a bus address register, its direction.
    pub fn bus_address_direction(self) -> Option<BusDirection> {
        match self {
            Self::BusReadAddr => Some(BusDirection::Read),
            Self::BusWriteAddr => Some(BusDirection::Write),
            _ => None,
        }
    }
}
