//! Identity allocation pools.
//!
//! Ordered generators of MAC / IPv4 / UDP-port values with a "next" cursor.
//! The manager owns one cursor per identity kind and advances it once per
//! created device; values carry into the next-higher field on overflow.

use std::net::Ipv4Addr;

use crate::error::CoreError;
use crate::mac::MacAddr;

/// Returns a list of `num` elements cycling through `items`.
///
/// `round_robin_list(5, &[a, b])` is `[a, b, a, b, a]`. An empty `items`
/// yields an empty list.
pub fn round_robin_list<T: Clone>(num: usize, items: &[T]) -> Vec<T> {
    if items.is_empty() {
        return Vec::new();
    }
    items.iter().cloned().cycle().take(num).collect()
}

/// MAC cursor, stepping by a configurable increment.
#[derive(Clone, Debug)]
pub struct MacPool {
    next: MacAddr,
    step: u64,
}

impl MacPool {
    pub fn new(base: MacAddr) -> Self {
        Self { next: base, step: 1 }
    }

    pub fn with_step(base: MacAddr, step: u64) -> Self {
        Self { next: base, step }
    }

    pub fn set_base(&mut self, base: MacAddr) {
        self.next = base;
    }

    pub fn peek(&self) -> MacAddr {
        self.next
    }

    /// Returns the current value and advances the cursor.
    pub fn take(&mut self) -> MacAddr {
        let value = self.next;
        self.next = self.next.wrapping_add(self.step);
        value
    }

    pub fn take_n(&mut self, n: usize) -> Vec<MacAddr> {
        (0..n).map(|_| self.take()).collect()
    }
}

/// IPv4 cursor.
#[derive(Clone, Debug)]
pub struct Ipv4Pool {
    next: Ipv4Addr,
}

impl Ipv4Pool {
    pub fn new(base: Ipv4Addr) -> Self {
        Self { next: base }
    }

    pub fn set_base(&mut self, base: Ipv4Addr) {
        self.next = base;
    }

    pub fn peek(&self) -> Ipv4Addr {
        self.next
    }

    pub fn take(&mut self) -> Ipv4Addr {
        let value = self.next;
        self.next = Ipv4Addr::from(u32::from(self.next).wrapping_add(1));
        value
    }

    pub fn take_n(&mut self, n: usize) -> Vec<Ipv4Addr> {
        (0..n).map(|_| self.take()).collect()
    }
}

/// UDP port cursor. Unlike the address pools this one is finite and fails
/// once the port space is exhausted.
#[derive(Clone, Debug)]
pub struct UdpPortPool {
    next: u32,
}

impl UdpPortPool {
    pub fn new(base: u16) -> Self {
        Self { next: u32::from(base) }
    }

    pub fn set_base(&mut self, base: u16) {
        self.next = u32::from(base);
    }

    pub fn take(&mut self) -> Result<u16, CoreError> {
        if self.next > u32::from(u16::MAX) {
            return Err(CoreError::invalid_argument(
                "UDP port pool exhausted".to_string(),
            ));
        }
        let value = self.next as u16;
        self.next += 1;
        Ok(value)
    }

    pub fn take_n(&mut self, n: usize) -> Result<Vec<u16>, CoreError> {
        (0..n).map(|_| self.take()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_examples() {
        assert_eq!(round_robin_list(5, &['a', 'b']), vec!['a', 'b', 'a', 'b', 'a']);
        assert_eq!(round_robin_list(0, &['a']), Vec::<char>::new());
        assert_eq!(round_robin_list(3, &[] as &[char]), Vec::<char>::new());
        assert_eq!(
            round_robin_list(4, &["first", "second", "third"]),
            vec!["first", "second", "third", "first"]
        );
    }

    #[test]
    fn mac_pool_advances_once_per_take() {
        let mut pool = MacPool::new("aa:aa:aa:aa:aa:a1".parse().unwrap());
        let macs = pool.take_n(2);
        assert_eq!(macs[0].to_string(), "aa:aa:aa:aa:aa:a1");
        assert_eq!(macs[1].to_string(), "aa:aa:aa:aa:aa:a2");
        assert_eq!(pool.peek().to_string(), "aa:aa:aa:aa:aa:a3");
    }

    #[test]
    fn mac_pool_with_larger_step() {
        let mut pool = MacPool::with_step("aa:aa:aa:aa:aa:00".parse().unwrap(), 0x100);
        let macs = pool.take_n(2);
        assert_eq!(macs[0].to_string(), "aa:aa:aa:aa:aa:00");
        assert_eq!(macs[1].to_string(), "aa:aa:aa:aa:ab:00");
    }

    #[test]
    fn ipv4_pool_carries_into_higher_octet() {
        let mut pool = Ipv4Pool::new(Ipv4Addr::new(10, 0, 0, 255));
        assert_eq!(pool.take(), Ipv4Addr::new(10, 0, 0, 255));
        assert_eq!(pool.take(), Ipv4Addr::new(10, 0, 1, 0));
    }

    #[test]
    fn udp_pool_fails_when_exhausted() {
        let mut pool = UdpPortPool::new(u16::MAX - 1);
        assert_eq!(pool.take().unwrap(), u16::MAX - 1);
        assert_eq!(pool.take().unwrap(), u16::MAX);
        assert!(pool.take().is_err());
    }
}
