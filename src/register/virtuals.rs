//! Registration-time virtual table
//!
//! Every virtual slot the base class declares gets an entry. A host method
//! overrides a slot when its name is the slot's host name (`_process` ->
//! `Process`); its signature is checked against the slot here, once, so
//! dispatch never has to.

use crate::classes::VirtualSlot;
use crate::engine::VirtualId;
use crate::error::RegistrationError;
use crate::variant::VariantType;

use super::naming::host_method_name;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct VirtualEntry {
    pub engine_name: &'static str,
    /// Index of the overriding host method
    pub method: Option<usize>,
    /// `_ready` with declared children: bind them before the hook runs
    pub binds_children: bool,
}

#[derive(Debug, Default)]
pub(crate) struct VirtualTable {
    entries: Vec<VirtualEntry>,
}

/// Host method as seen by the table builder
pub(crate) struct HostMethod<'a> {
    pub host: &'a str,
    pub params: &'a [VariantType],
}

impl VirtualTable {
    /// Match `methods` against `slots`; the second result flags the methods
    /// consumed as overrides
    pub fn build(
        class: &str,
        slots: &[VirtualSlot],
        methods: &[HostMethod<'_>],
        has_children: bool,
    ) -> Result<(Self, Vec<bool>), RegistrationError> {
        let mut overrides = vec![false; methods.len()];
        let mut entries: Vec<VirtualEntry> = Vec::new();

        for slot in slots {
            let host = host_method_name(slot.name);
            let method = methods.iter().position(|m| m.host == host);
            if let Some(index) = method {
                check_signature(class, slot, &methods[index])?;
                overrides[index] = true;
            }
            let binds_children = has_children && slot.name == "_ready";
            if method.is_none() && !binds_children {
                continue;
            }
            let entry = VirtualEntry {
                engine_name: slot.name,
                method,
                binds_children,
            };
            // A subclass redeclaring a slot replaces the inherited entry
            match entries.iter_mut().find(|e| e.engine_name == slot.name) {
                Some(existing) => *existing = entry,
                None => entries.push(entry),
            }
        }
        Ok((Self { entries }, overrides))
    }

    pub fn resolve(&self, engine_name: &str) -> Option<VirtualId> {
        self.entries
            .iter()
            .position(|e| e.engine_name == engine_name)
            .map(|index| VirtualId(index as u32))
    }

    pub fn get(&self, id: VirtualId) -> Option<&VirtualEntry> {
        self.entries.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn check_signature(
    class: &str,
    slot: &VirtualSlot,
    method: &HostMethod<'_>,
) -> Result<(), RegistrationError> {
    if slot.params.len() != method.params.len() {
        return Err(RegistrationError::VirtualArity {
            class: class.to_string(),
            method: method.host.to_string(),
            engine_name: slot.name.to_string(),
            expected: slot.params.len(),
            found: method.params.len(),
        });
    }
    for (index, (&expected, &found)) in slot.params.iter().zip(method.params).enumerate() {
        if !compatible(expected, found) {
            return Err(RegistrationError::VirtualParamType {
                class: class.to_string(),
                method: method.host.to_string(),
                engine_name: slot.name.to_string(),
                index,
                expected,
                found,
            });
        }
    }
    Ok(())
}

/// `Nil` on either side accepts anything; ints widen to floats
fn compatible(engine: VariantType, host: VariantType) -> bool {
    engine == host
        || engine.is_any()
        || host.is_any()
        || (engine == VariantType::Int && host == VariantType::Float)
}
