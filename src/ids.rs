//! Identifier and timestamp primitives shared by every record
use bech32::Bech32m;
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use uuid7::uuid7;

// mint a fresh uuid7 and encode it under the entity's hrp
fn mint(hrp: &str) -> String {
    let hrp = bech32::Hrp::parse(hrp).expect("entity hrp is static and bech32-valid");
    bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .expect("a uuid payload fits bech32 length limits")
}

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident, $hrp:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, minicbor::Encode, minicbor::Decode,
        )]
        #[cbor(transparent)]
        pub struct $name(#[n(0)] String);

        impl $name {
            pub const HRP: &'static str = $hrp;

            pub fn new() -> Self {
                Self(mint(Self::HRP))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

entity_id!(
    /// Identity anchor for a marketplace member.
    UserId,
    "user_"
);
entity_id!(
    /// A listed product.
    ProductId,
    "prod_"
);
entity_id!(
    /// A swap proposal, prior to acceptance.
    RequestId,
    "req_"
);
entity_id!(
    /// A realized swap with its own completion lifecycle.
    SwapId,
    "swap_"
);

impl SwapId {
    // the hold index stores swap ids as raw bytes
    pub(crate) fn from_raw(raw: String) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl<T: TimeZone> PartialEq for TimeStamp<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: TimeZone> Eq for TimeStamp<T> {}

impl<T: TimeZone> PartialOrd for TimeStamp<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TimeZone> Ord for TimeStamp<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }

    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }

    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_hrp() {
        assert!(UserId::new().as_str().starts_with("user_1"));
        assert!(ProductId::new().as_str().starts_with("prod_1"));
        assert!(RequestId::new().as_str().starts_with("req_1"));
        assert!(SwapId::new().as_str().starts_with("swap_1"));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(ProductId::new(), ProductId::new());
    }

    #[test]
    fn id_encoding() {
        let original = SwapId::new();

        let encoding = minicbor::to_vec(&original).unwrap();
        let decode: SwapId = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(&original).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }
}
