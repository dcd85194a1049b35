use std::collections::HashMap;

use super::{Object, ObjectId};
use crate::name::Name;

struct Entry {
    object: Object,
    next_by_name: Option<ObjectId>,
    next_by_outer: Option<ObjectId>,
    /// Key of the outer chain this entry is linked into.
    outer_key: Option<u64>,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// Arena owning every constructed object.
///
/// Lookup goes through two hash-to-chain-head maps: one keyed by the name
/// hash and one keyed by `name hash ^ outer name hash`. Chains are threaded
/// through the entries themselves; a new object becomes the chain head.
#[derive(Default)]
pub struct ObjectContainer {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_name: HashMap<u64, ObjectId>,
    by_outer: HashMap<u64, ObjectId>,
    len: usize,
}

fn outer_key(name: &Name, outer: &Name) -> u64 {
    name.hash_value() ^ outer.hash_value()
}

impl ObjectContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn entry(&self, id: ObjectId) -> Option<&Entry> {
        let slot = self.slots.get(id.slot())?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, id: ObjectId) -> Option<&mut Entry> {
        let slot = self.slots.get_mut(id.slot())?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.entry.as_mut()
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.entry(id).map(|e| &e.object)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.entry_mut(id).map(|e| &mut e.object)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.entry(id).is_some()
    }

    pub fn add(&mut self, object: Object) -> ObjectId {
        let name_hash = object.name.hash_value();
        let outer = object.outer;
        let entry = Entry {
            object,
            next_by_name: self.by_name.get(&name_hash).copied(),
            next_by_outer: None,
            outer_key: None,
        };

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                ObjectId::new(index, slot.generation)
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                ObjectId::new(self.slots.len() as u32 - 1, 0)
            }
        };
        self.by_name.insert(name_hash, id);
        self.len += 1;
        if outer.is_some() {
            self.link_outer(id);
        }
        id
    }

    /// Change the outer of `id`, moving it to the matching outer chain.
    pub fn set_outer(&mut self, id: ObjectId, outer: Option<ObjectId>) {
        self.unlink_outer(id);
        if let Some(entry) = self.entry_mut(id) {
            entry.object.outer = outer;
        }
        self.link_outer(id);
    }

    fn link_outer(&mut self, id: ObjectId) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        let Some(outer_name) = entry.object.outer.and_then(|o| self.get(o)).map(|o| o.name.clone())
        else {
            return;
        };
        let key = outer_key(&entry.object.name, &outer_name);
        let head = self.by_outer.insert(key, id);
        if let Some(entry) = self.entry_mut(id) {
            entry.next_by_outer = head;
            entry.outer_key = Some(key);
        }
    }

    fn unlink_outer(&mut self, id: ObjectId) {
        let Some(key) = self.entry(id).and_then(|e| e.outer_key) else {
            return;
        };
        let next = self.entry(id).and_then(|e| e.next_by_outer);
        if self.by_outer.get(&key) == Some(&id) {
            match next {
                Some(next) => self.by_outer.insert(key, next),
                None => self.by_outer.remove(&key),
            };
        } else {
            let mut cursor = self.by_outer.get(&key).copied();
            while let Some(cur) = cursor {
                let following = self.entry(cur).and_then(|e| e.next_by_outer);
                if following == Some(id) {
                    if let Some(e) = self.entry_mut(cur) {
                        e.next_by_outer = next;
                    }
                    break;
                }
                cursor = following;
            }
        }
        if let Some(entry) = self.entry_mut(id) {
            entry.next_by_outer = None;
            entry.outer_key = None;
        }
    }

    fn unlink_name(&mut self, id: ObjectId) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        let key = entry.object.name.hash_value();
        let next = entry.next_by_name;
        if self.by_name.get(&key) == Some(&id) {
            match next {
                Some(next) => self.by_name.insert(key, next),
                None => self.by_name.remove(&key),
            };
            return;
        }
        let mut cursor = self.by_name.get(&key).copied();
        while let Some(cur) = cursor {
            let following = self.entry(cur).and_then(|e| e.next_by_name);
            if following == Some(id) {
                if let Some(e) = self.entry_mut(cur) {
                    e.next_by_name = next;
                }
                return;
            }
            cursor = following;
        }
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<Object> {
        self.entry(id)?;
        self.unlink_outer(id);
        self.unlink_name(id);
        let slot = &mut self.slots[id.slot()];
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.slot() as u32);
        self.len -= 1;
        Some(entry.object)
    }

    /// Every object in the name chain of `name`, newest first. Hash
    /// collisions are filtered out.
    pub fn find_all<'a>(&'a self, name: &'a Name) -> impl Iterator<Item = ObjectId> + 'a {
        let mut cursor = self.by_name.get(&name.hash_value()).copied();
        std::iter::from_fn(move || {
            let id = cursor?;
            let entry = self.entry(id)?;
            cursor = entry.next_by_name;
            Some((id, &entry.object.name))
        })
        .filter(move |(_, n)| *n == name)
        .map(|(id, _)| id)
    }

    pub fn find(&self, name: &Name) -> Option<ObjectId> {
        self.find_all(name).next()
    }

    /// Newest object called `name` whose outer is called `outer`.
    pub fn find_by_outer(&self, name: &Name, outer: &Name) -> Option<ObjectId> {
        self.find_all_by_outer(name, outer).next()
    }

    pub fn find_all_by_outer<'a>(
        &'a self,
        name: &'a Name,
        outer: &'a Name,
    ) -> impl Iterator<Item = ObjectId> + 'a {
        let mut cursor = self.by_outer.get(&outer_key(name, outer)).copied();
        std::iter::from_fn(move || {
            let id = cursor?;
            let entry = self.entry(id)?;
            cursor = entry.next_by_outer;
            Some((id, &entry.object))
        })
        .filter(move |(_, o)| {
            o.name == *name
                && o.outer
                    .and_then(|outer_id| self.get(outer_id))
                    .map_or(false, |o| o.name == *outer)
        })
        .map(|(id, _)| id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.entry
                .as_ref()
                .map(|e| (ObjectId::new(i as u32, slot.generation), &e.object))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectKind;
    use proptest::prelude::*;

    fn object(name: &str) -> Object {
        Object::new(Name::new(name), Name::new("Package"), ObjectKind::Package)
    }

    #[test]
    fn shared_names_chain() {
        let mut c = ObjectContainer::new();
        let engine = c.add(object("Engine"));
        let core = c.add(object("Core"));
        let mut a = object("Actor");
        a.outer = Some(engine);
        let a = c.add(a);
        let mut b = object("actor");
        b.outer = Some(core);
        let b = c.add(b);

        let all: Vec<_> = c.find_all(&Name::new("ACTOR")).collect();
        assert_eq!(all, vec![b, a]);
        assert_eq!(c.find_by_outer(&Name::new("Actor"), &Name::new("engine")), Some(a));
        assert_eq!(c.find_by_outer(&Name::new("Actor"), &Name::new("Core")), Some(b));
        assert_eq!(c.find_by_outer(&Name::new("Actor"), &Name::new("Other")), None);
    }

    #[test]
    fn remove_splices_chain() {
        let mut c = ObjectContainer::new();
        let pkg = c.add(object("Pkg"));
        let ids: Vec<_> = (0..3)
            .map(|_| {
                let mut o = object("Same");
                o.outer = Some(pkg);
                c.add(o)
            })
            .collect();
        let removed = c.remove(ids[1]).unwrap();
        assert_eq!(removed.name, Name::new("Same"));
        assert!(c.get(ids[1]).is_none());

        let all: Vec<_> = c.find_all(&Name::new("Same")).collect();
        assert_eq!(all, vec![ids[2], ids[0]]);
        let by_outer: Vec<_> = c
            .find_all_by_outer(&Name::new("Same"), &Name::new("Pkg"))
            .collect();
        assert_eq!(by_outer, vec![ids[2], ids[0]]);
    }

    #[test]
    fn stale_handles_are_rejected() {
        let mut c = ObjectContainer::new();
        let old = c.add(object("A"));
        c.remove(old);
        let new = c.add(object("B"));
        assert_eq!(old.slot(), new.slot());
        assert!(c.get(old).is_none());
        assert_eq!(c.get(new).unwrap().name, Name::new("B"));
        assert!(c.remove(old).is_none());
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn numbered_names_are_distinct() {
        let mut c = ObjectContainer::new();
        let plain = c.add(object("Light"));
        let numbered = c.add(Object::new(
            Name::with_number("Light", 3),
            Name::new("Light"),
            ObjectKind::Unknown,
        ));
        assert_eq!(c.find(&Name::new("Light")), Some(plain));
        assert_eq!(c.find(&Name::with_number("Light", 3)), Some(numbered));
    }

    #[test]
    fn set_outer_relinks() {
        let mut c = ObjectContainer::new();
        let a = c.add(object("A"));
        let b = c.add(object("B"));
        let child = c.add(object("Child"));
        c.set_outer(child, Some(a));
        assert_eq!(c.find_by_outer(&Name::new("Child"), &Name::new("A")), Some(child));
        c.set_outer(child, Some(b));
        assert_eq!(c.find_by_outer(&Name::new("Child"), &Name::new("A")), None);
        assert_eq!(c.find_by_outer(&Name::new("Child"), &Name::new("B")), Some(child));
    }

    proptest! {
        #[test]
        fn lookup_completeness(names in prop::collection::vec("[a-d]{1,2}", 1..40), remove in any::<prop::sample::Index>()) {
            let mut c = ObjectContainer::new();
            let ids: Vec<_> = names.iter().map(|n| c.add(object(n))).collect();
            for (id, n) in ids.iter().zip(&names) {
                prop_assert!(c.find_all(&Name::new(n.as_str())).any(|x| x == *id));
            }
            let victim = ids[remove.index(ids.len())];
            let name = c.get(victim).unwrap().name.clone();
            c.remove(victim);
            prop_assert!(!c.find_all(&name).any(|x| x == victim));
            for id in ids.iter().filter(|id| **id != victim) {
                let n = &c.get(*id).unwrap().name;
                prop_assert!(c.find_all(n).any(|x| x == *id));
            }
        }
    }
}
