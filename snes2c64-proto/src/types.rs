//! Gamepad-map types: SNES source keys, C64 targets, slot indices and the
//! per-slot [`GamepadMap`].

use core::fmt;
use core::ops::{BitAnd, BitOr, BitOrAssign, Not};
use core::str::FromStr;

/// Number of SNES source keys in one slot.
pub const KEY_COUNT: usize = 10;

/// Number of slots stored by the adapter.
pub const SLOT_COUNT: usize = 8;

/// A physical input on the SNES pad.
///
/// The declaration order is the adapter's slot layout: entry `n` of a slot
/// belongs to the key whose [`index`](SnesKey::index) is `n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SnesKey {
    B,
    Y,
    Up,
    Down,
    Left,
    Right,
    A,
    X,
    L,
    R,
}

impl SnesKey {
    /// All keys in wire order.
    pub const ALL: [SnesKey; KEY_COUNT] = [
        SnesKey::B,
        SnesKey::Y,
        SnesKey::Up,
        SnesKey::Down,
        SnesKey::Left,
        SnesKey::Right,
        SnesKey::A,
        SnesKey::X,
        SnesKey::L,
        SnesKey::R,
    ];

    /// Position of this key inside a slot.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Look up a key by slot position.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < KEY_COUNT {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    /// Short lower-case name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            SnesKey::B => "b",
            SnesKey::Y => "y",
            SnesKey::Up => "up",
            SnesKey::Down => "down",
            SnesKey::Left => "left",
            SnesKey::Right => "right",
            SnesKey::A => "a",
            SnesKey::X => "x",
            SnesKey::L => "l",
            SnesKey::R => "r",
        }
    }
}

impl fmt::Display for SnesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SnesKey {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.name().eq_ignore_ascii_case(s))
            .ok_or(NameError::UnknownKey)
    }
}

/// A single output line on the C64 joystick port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum C64Target {
    JoyUp,
    JoyDown,
    JoyLeft,
    JoyRight,
    Fire1,
    Fire2,
    Fire3,
    FireA,
}

impl C64Target {
    /// All targets in bit order (bit 0 first).
    pub const ALL: [C64Target; 8] = [
        C64Target::JoyUp,
        C64Target::JoyDown,
        C64Target::JoyLeft,
        C64Target::JoyRight,
        C64Target::Fire1,
        C64Target::Fire2,
        C64Target::Fire3,
        C64Target::FireA,
    ];

    /// Wire bit for this target.
    #[inline]
    #[must_use]
    pub const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Short lower-case name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            C64Target::JoyUp => "up",
            C64Target::JoyDown => "down",
            C64Target::JoyLeft => "left",
            C64Target::JoyRight => "right",
            C64Target::Fire1 => "fire1",
            C64Target::Fire2 => "fire2",
            C64Target::Fire3 => "fire3",
            C64Target::FireA => "firea",
        }
    }
}

impl fmt::Display for C64Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for C64Target {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|target| target.name().eq_ignore_ascii_case(s))
            .ok_or(NameError::UnknownTarget)
    }
}

/// Set of C64 targets driven by one SNES key.
///
/// # Example
///
/// ```
/// use snes2c64_proto::{C64Target, C64Targets};
///
/// let targets = C64Targets::FIRE_1 | C64Targets::JOY_UP;
/// assert!(targets.contains(C64Targets::FIRE_1));
/// assert!(targets.has(C64Target::JoyUp));
/// assert!(!targets.has(C64Target::FireA));
/// ```
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct C64Targets(u8);

impl C64Targets {
    pub const JOY_UP: Self = Self(C64Target::JoyUp.bit());
    pub const JOY_DOWN: Self = Self(C64Target::JoyDown.bit());
    pub const JOY_LEFT: Self = Self(C64Target::JoyLeft.bit());
    pub const JOY_RIGHT: Self = Self(C64Target::JoyRight.bit());
    pub const FIRE_1: Self = Self(C64Target::Fire1.bit());
    pub const FIRE_2: Self = Self(C64Target::Fire2.bit());
    pub const FIRE_3: Self = Self(C64Target::Fire3.bit());
    pub const FIRE_A: Self = Self(C64Target::FireA.bit());

    /// No target.
    pub const NONE: Self = Self(0);

    /// Every known target.
    pub const ALL: Self = Self(0xFF);

    /// Build a set from wire bits, dropping bits no known target uses.
    #[inline]
    #[must_use]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Raw wire bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Check if every target in `other` is present.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: C64Targets) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Check a single target.
    #[inline]
    #[must_use]
    pub const fn has(self, target: C64Target) -> bool {
        self.0 & target.bit() != 0
    }

    /// Set or clear one target.
    #[inline]
    pub fn set(&mut self, target: C64Target, active: bool) {
        if active {
            self.0 |= target.bit();
        } else {
            self.0 &= !target.bit();
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate over the active targets in bit order.
    pub fn iter(self) -> impl Iterator<Item = C64Target> {
        C64Target::ALL.into_iter().filter(move |t| self.has(*t))
    }
}

impl From<C64Target> for C64Targets {
    fn from(target: C64Target) -> Self {
        Self(target.bit())
    }
}

impl BitOr for C64Targets {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for C64Targets {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for C64Targets {
    type Output = Self;

    #[inline]
    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl Not for C64Targets {
    type Output = Self;

    #[inline]
    fn not(self) -> Self::Output {
        Self(!self.0 & Self::ALL.0)
    }
}

/// Slot number on the adapter, always in `0..8`.
///
/// There is no way to build an out-of-range index, so session calls that
/// take a `SlotIndex` cannot address a slot the adapter does not have.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotIndex(u8);

impl SlotIndex {
    /// Every slot in ascending order.
    pub const ALL: [SlotIndex; SLOT_COUNT] = [
        SlotIndex(0),
        SlotIndex(1),
        SlotIndex(2),
        SlotIndex(3),
        SlotIndex(4),
        SlotIndex(5),
        SlotIndex(6),
        SlotIndex(7),
    ];

    /// Checked constructor.
    ///
    /// # Errors
    ///
    /// Returns [`SlotIndexOutOfRange`] for values of 8 and above.
    pub const fn new(index: u8) -> Result<Self, SlotIndexOutOfRange> {
        if (index as usize) < SLOT_COUNT {
            Ok(Self(index))
        } else {
            Err(SlotIndexOutOfRange(index))
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<u8> for SlotIndex {
    type Error = SlotIndexOutOfRange;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A slot index outside `0..8` was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotIndexOutOfRange(pub u8);

impl fmt::Display for SlotIndexOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot index {} out of range (0-{})", self.0, SLOT_COUNT - 1)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SlotIndexOutOfRange {}

/// Structured button mapping for one slot.
///
/// Holds the set of C64 targets driven by each of the ten SNES keys. Use
/// [`codec::encode`](crate::codec::encode) to get the adapter's bytes.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GamepadMap {
    keys: [C64Targets; KEY_COUNT],
}

impl GamepadMap {
    /// A map with no assignments.
    pub const EMPTY: Self = Self {
        keys: [C64Targets::NONE; KEY_COUNT],
    };

    #[must_use]
    pub const fn new() -> Self {
        Self::EMPTY
    }

    /// Targets currently driven by `key`.
    #[inline]
    #[must_use]
    pub const fn targets(&self, key: SnesKey) -> C64Targets {
        self.keys[key.index()]
    }

    /// Replace all targets of `key`.
    #[inline]
    pub fn set_targets(&mut self, key: SnesKey, targets: C64Targets) {
        self.keys[key.index()] = targets;
    }

    /// Mark one target active or inactive for `key`.
    #[inline]
    pub fn set(&mut self, key: SnesKey, target: C64Target, active: bool) {
        self.keys[key.index()].set(target, active);
    }

    /// Flip one target for `key`.
    pub fn toggle(&mut self, key: SnesKey, target: C64Target) {
        let active = self.targets(key).has(target);
        self.set(key, target, !active);
    }

    /// Builder-style variant of [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, key: SnesKey, target: C64Target) -> Self {
        self.set(key, target, true);
        self
    }

    /// Remove every assignment.
    pub fn clear(&mut self) {
        *self = Self::EMPTY;
    }

    /// `(key, targets)` pairs in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (SnesKey, C64Targets)> + '_ {
        SnesKey::ALL.into_iter().map(|key| (key, self.targets(key)))
    }

    /// True when no key drives any target.
    ///
    /// Shorthand for [`codec::is_empty`](crate::codec::is_empty).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        crate::codec::is_empty(self)
    }
}

/// Prints assigned keys as `key=target+target`, space separated.
///
/// An empty map prints as `-`. The output parses back with [`FromStr`].
impl fmt::Display for GamepadMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, targets) in self.iter().filter(|(_, t)| !t.is_empty()) {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{key}=")?;
            for (i, target) in targets.iter().enumerate() {
                if i > 0 {
                    f.write_str("+")?;
                }
                write!(f, "{target}")?;
            }
        }
        if first {
            f.write_str("-")?;
        }
        Ok(())
    }
}

impl FromStr for GamepadMap {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut map = GamepadMap::EMPTY;
        let s = s.trim();
        if s == "-" {
            return Ok(map);
        }
        for assignment in s.split_whitespace() {
            let (key, targets) = assignment.split_once('=').ok_or(NameError::Syntax)?;
            let key: SnesKey = key.parse()?;
            for target in targets.split('+').filter(|t| !t.is_empty()) {
                map.set(key, target.parse()?, true);
            }
        }
        Ok(map)
    }
}

/// Error from parsing key, target or map names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NameError {
    /// Not one of the SNES key names.
    UnknownKey,
    /// Not one of the C64 target names.
    UnknownTarget,
    /// Assignment is not of the form `key=target[+target...]`.
    Syntax,
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKey => write!(f, "unknown SNES key (b, y, up, down, left, right, a, x, l, r)"),
            Self::UnknownTarget => write!(
                f,
                "unknown C64 target (up, down, left, right, fire1, fire2, fire3, firea)"
            ),
            Self::Syntax => write!(f, "expected key=target[+target...]"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for NameError {}
