//! IPv4 network blocks.

use std::{fmt::Display, net::Ipv4Addr, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::config::Error;

/// The longest prefix of a subnet carved from an [`Ipv4Cidr`].
pub const MAX_SUBNET_PREFIX: u8 = 28;

/// The default address block of the network (`10.0.0.0/16`).
pub const DEFAULT_CIDR_BLOCK: Ipv4Cidr = Ipv4Cidr {
    address: Ipv4Addr::new(10, 0, 0, 0),
    prefix: 16,
};

/// An IPv4 network block in CIDR notation (e.g. `10.0.0.0/16`).
///
/// The address must be the network address of the block, i.e. all host bits are unset.
///
/// # Examples
///
/// ```
/// use pkhsm_stack::config::Ipv4Cidr;
///
/// # fn main() -> testresult::TestResult {
/// let cidr: Ipv4Cidr = "10.0.0.0/16".parse()?;
/// assert_eq!(cidr.prefix(), 16);
/// assert!("10.0.0.1/16".parse::<Ipv4Cidr>().is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(into = "String", try_from = "String")]
pub struct Ipv4Cidr {
    address: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Creates a new [`Ipv4Cidr`].
    ///
    /// # Errors
    ///
    /// Returns an error if
    /// - `prefix` is larger than 32,
    /// - or `address` has host bits set.
    pub fn new(address: Ipv4Addr, prefix: u8) -> Result<Self, Error> {
        let value = || format!("{address}/{prefix}");
        if prefix > 32 {
            return Err(Error::InvalidCidr {
                value: value(),
                reason: "the prefix must not be larger than 32",
            });
        }
        if u32::from(address) & !Self::mask(prefix) != 0 {
            return Err(Error::InvalidCidr {
                value: value(),
                reason: "the address has host bits set",
            });
        }
        Ok(Self { address, prefix })
    }

    fn mask(prefix: u8) -> u32 {
        u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0)
    }

    /// Returns the network address.
    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    /// Returns the prefix length.
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Splits the block into `count` subnets of equal size.
    ///
    /// The prefix of the subnets is extended by the number of bits required to address `count`
    /// subnets.
    /// If `count` is not a power of two, the remainder of the block stays unused.
    ///
    /// # Errors
    ///
    /// Returns an error if `count` is zero or if the subnets would have a prefix longer than
    /// [`MAX_SUBNET_PREFIX`].
    ///
    /// # Examples
    ///
    /// ```
    /// use pkhsm_stack::config::Ipv4Cidr;
    ///
    /// # fn main() -> testresult::TestResult {
    /// let cidr: Ipv4Cidr = "10.0.0.0/16".parse()?;
    /// let subnets: Vec<String> = cidr.subnets(3)?.iter().map(ToString::to_string).collect();
    /// assert_eq!(subnets, ["10.0.0.0/18", "10.0.64.0/18", "10.0.128.0/18"]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn subnets(&self, count: usize) -> Result<Vec<Ipv4Cidr>, Error> {
        let too_many = || Error::TooManySubnets {
            cidr: *self,
            count,
        };
        if count == 0 {
            return Err(too_many());
        }
        let bits = count.next_power_of_two().trailing_zeros();
        let prefix = u32::from(self.prefix) + bits;
        if prefix > u32::from(MAX_SUBNET_PREFIX) {
            return Err(too_many());
        }
        let size = 1u32 << (32 - prefix);
        let base = u32::from(self.address);

        (0..count)
            .map(|index| {
                let offset = u32::try_from(index).map_err(|_| too_many())? * size;
                Self::new(Ipv4Addr::from(base + offset), prefix as u8)
            })
            .collect()
    }
}

impl Display for Ipv4Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| Error::InvalidCidr {
            value: s.to_string(),
            reason,
        };
        let Some((address, prefix)) = s.split_once('/') else {
            return Err(invalid("expected <address>/<prefix>"));
        };
        let address = address
            .parse::<Ipv4Addr>()
            .map_err(|_| invalid("the address is not a valid IPv4 address"))?;
        let prefix = prefix
            .parse::<u8>()
            .map_err(|_| invalid("the prefix is not a number"))?;
        Self::new(address, prefix)
    }
}

impl From<Ipv4Cidr> for String {
    fn from(value: Ipv4Cidr) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use testresult::TestResult;

    use super::*;

    #[rstest]
    #[case("10.0.0.0/16", 1, &["10.0.0.0/16"])]
    #[case("10.0.0.0/16", 2, &["10.0.0.0/17", "10.0.128.0/17"])]
    #[case("192.168.0.0/24", 4, &["192.168.0.0/26", "192.168.0.64/26", "192.168.0.128/26", "192.168.0.192/26"])]
    fn subnets_are_carved_evenly(
        #[case] cidr: &str,
        #[case] count: usize,
        #[case] expected: &[&str],
    ) -> TestResult {
        let subnets: Vec<String> = cidr
            .parse::<Ipv4Cidr>()?
            .subnets(count)?
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(subnets, expected);
        Ok(())
    }

    #[rstest]
    #[case("10.0.0.0/28", 2)]
    #[case("10.0.0.0/16", 0)]
    fn unsplittable_blocks_fail(#[case] cidr: &str, #[case] count: usize) -> TestResult {
        assert!(matches!(
            cidr.parse::<Ipv4Cidr>()?.subnets(count),
            Err(Error::TooManySubnets { .. })
        ));
        Ok(())
    }

    #[rstest]
    #[case("10.0.0.0")]
    #[case("10.0.0.0/33")]
    #[case("10.0.0.256/16")]
    #[case("10.0.1.0/16")]
    fn invalid_blocks_fail(#[case] cidr: &str) {
        assert!(matches!(
            cidr.parse::<Ipv4Cidr>(),
            Err(Error::InvalidCidr { .. })
        ));
    }
}
