use crate::error::{Error, Result};

use super::msg::RawAttr;

/// Expected shape of one attribute in a family's attribute table, indexed
/// by attribute type.
#[derive(Debug, Clone, Copy)]
pub struct AttrSpec {
    pub index: u16,
    pub min_len: usize,
    pub max_len: usize,
    pub required: bool,
}

impl AttrSpec {
    pub const fn fixed(index: u16, len: usize, required: bool) -> AttrSpec {
        AttrSpec {
            index,
            min_len: len,
            max_len: len,
            required,
        }
    }

    pub const fn bounded(index: u16, min_len: usize, max_len: usize, required: bool) -> AttrSpec {
        AttrSpec {
            index,
            min_len,
            max_len,
            required,
        }
    }
}

/// Validates `attrs` against `policy` and returns one slice per policy
/// entry, in policy order, `None` where an optional attribute was absent.
/// Unknown attribute types in `attrs` are ignored; duplicates keep the
/// last occurrence, matching the kernel's own netlink attribute parser.
pub fn parse<'a>(attrs: &[RawAttr<'a>], policy: &[AttrSpec]) -> Result<Vec<Option<&'a [u8]>>> {
    let mut out: Vec<Option<&'a [u8]>> = vec![None; policy.len()];
    for attr in attrs {
        if let Some((slot, spec)) = policy
            .iter()
            .enumerate()
            .find(|(_, spec)| spec.index == attr.attr_type)
        {
            if attr.value.len() < spec.min_len || attr.value.len() > spec.max_len {
                return Err(Error::AttrBadLen {
                    index: attr.attr_type,
                    len: attr.value.len(),
                });
            }
            out[slot] = Some(attr.value);
        }
    }
    for (slot, spec) in policy.iter().enumerate() {
        if spec.required && out[slot].is_none() {
            return Err(Error::AttrMissing { index: spec.index });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::msg::{parse_attrs, put_attr_u32};
    use crate::buffer::Buffer;

    #[test]
    fn missing_required_attribute_is_an_error() {
        let buf = Buffer::new();
        let attrs = parse_attrs(buf.as_slice()).unwrap();
        let policy = [AttrSpec::fixed(1, 4, true)];
        assert!(matches!(parse(&attrs, &policy), Err(Error::AttrMissing { index: 1 })));
    }

    #[test]
    fn unknown_attribute_is_ignored() {
        let mut buf = Buffer::new();
        put_attr_u32(&mut buf, 99, 1);
        put_attr_u32(&mut buf, 1, 42);
        let attrs = parse_attrs(buf.as_slice()).unwrap();
        let policy = [AttrSpec::fixed(1, 4, true)];
        let parsed = parse(&attrs, &policy).unwrap();
        assert_eq!(parsed[0], Some(&42u32.to_ne_bytes()[..]));
    }
}
