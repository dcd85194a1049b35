//! Package environment: loads packages into one shared object container and
//! resolves package indices to objects on demand.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use crate::build::BuildTable;
use crate::compression::{Decompressor, ZlibDecompressor};
use crate::config::LoaderConfig;
use crate::decoder::BufferDecoder;
use crate::decompiler::{ClassWriter, Decompiled, Decompiler};
use crate::error::{Error, Result};
use crate::index::{IndexTarget, PackageIndex};
use crate::name::{Name, NameRef};
use crate::object::{
    ClassRegistry, DeserializationState, FunctionFlags, Object, ObjectContainer, ObjectFlags,
    ObjectId, ObjectKind, ObjectResolver,
};
use crate::package::{LoadOptions, Package, PackageId};
use crate::provider::{FsPackageProvider, NullProvider, PackageProvider};
use crate::script::{read_script, NativeFormat, NativeFunction, NativeFunctionCache};
use crate::tables::ObjectTableItem;

const MAX_CHILDREN: usize = 4096;

pub struct Environment {
    packages: Vec<Rc<Package>>,
    by_name: HashMap<String, PackageId>,
    /// Root `Package` object of each loaded package.
    roots: Vec<ObjectId>,
    container: ObjectContainer,
    registry: ClassRegistry,
    natives: Arc<NativeFunctionCache>,
    provider: Box<dyn PackageProvider>,
    builds: BuildTable,
    decoder: Option<Box<dyn BufferDecoder>>,
    decompressor: Option<Box<dyn Decompressor>>,
    /// Packages being opened, so a provider cycle does not recurse.
    loading: HashSet<String>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            packages: Vec::new(),
            by_name: HashMap::new(),
            roots: Vec::new(),
            container: ObjectContainer::new(),
            registry: ClassRegistry::new(),
            natives: Arc::new(NativeFunctionCache::new()),
            provider: Box::new(NullProvider),
            builds: BuildTable::default(),
            decoder: None,
            decompressor: Some(Box::new(ZlibDecompressor)),
            loading: HashSet::new(),
        }
    }

    /// Environment with the search roots, builds and decoder of `config`.
    pub fn from_config(config: &LoaderConfig) -> Result<Self> {
        let mut env = Self::new()
            .with_builds(config.build_table()?)
            .with_provider(Box::new(FsPackageProvider::from_config(config)));
        if let Some(decoder) = config.xor_decoder() {
            env = env.with_decoder(Box::new(decoder));
        }
        Ok(env)
    }

    pub fn with_provider(mut self, provider: Box<dyn PackageProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_builds(mut self, builds: BuildTable) -> Self {
        self.builds = builds;
        self
    }

    pub fn with_decoder(mut self, decoder: Box<dyn BufferDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Replace the decompressor; `None` leaves compressed packages at their summary.
    pub fn with_decompressor(mut self, decompressor: Option<Box<dyn Decompressor>>) -> Self {
        self.decompressor = decompressor;
        self
    }

    pub fn with_registry(mut self, registry: ClassRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_natives(mut self, natives: Arc<NativeFunctionCache>) -> Self {
        self.natives = natives;
        self
    }

    pub fn container(&self) -> &ObjectContainer {
        &self.container
    }

    pub fn object(&self, id: ObjectId) -> Option<&Object> {
        self.container.get(id)
    }

    pub fn natives(&self) -> &Arc<NativeFunctionCache> {
        &self.natives
    }

    pub fn packages(&self) -> &[Rc<Package>] {
        &self.packages
    }

    pub fn package(&self, id: PackageId) -> Option<&Rc<Package>> {
        self.packages.get(id)
    }

    pub fn find_package(&self, name: &str) -> Option<PackageId> {
        self.by_name.get(&name.to_ascii_lowercase()).copied()
    }

    /// Root `Package` object of a loaded package.
    pub fn package_root(&self, id: PackageId) -> Option<ObjectId> {
        self.roots.get(id).copied()
    }

    fn package_rc(&self, id: PackageId) -> Result<Rc<Package>> {
        self.packages
            .get(id)
            .cloned()
            .ok_or_else(|| Error::format("environment", format!("no package with id {}", id)))
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<PackageId> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unnamed")
            .to_string();
        let data = std::fs::read(path)?;
        self.load_package(name, data)
    }

    /// Open `data` as the package `name`. Loading a name twice returns the
    /// first package.
    pub fn load_package(&mut self, name: impl Into<String>, data: Vec<u8>) -> Result<PackageId> {
        let name = name.into();
        if let Some(id) = self.find_package(&name) {
            return Ok(id);
        }

        let mut options = LoadOptions::new(&self.builds);
        if let Some(decoder) = self.decoder.as_deref() {
            options = options.with_decoder(decoder);
        }
        if let Some(decompressor) = self.decompressor.as_deref() {
            options = options.with_decompressor(decompressor);
        }
        let package = Package::from_bytes(name.clone(), data, options)?;
        log::info!(
            "loaded {} (version {}/{}, build {})",
            name,
            package.summary.version,
            package.summary.licensee,
            package.summary.build.name()
        );

        let id = self.packages.len();
        let root_name = Name::new(name.clone());
        // An earlier import may already stand in for this package.
        let existing = self.container.find_all(&root_name).find(|&o| {
            self.container
                .get(o)
                .map_or(false, |o| o.outer.is_none() && matches!(o.kind, ObjectKind::Package))
        });
        let root = match existing {
            Some(root) => root,
            None => self.container.add(Object::new(
                root_name,
                Name::new("Package"),
                ObjectKind::Package,
            )),
        };
        if let Some(object) = self.container.get_mut(root) {
            object.package = Some(id);
            object.state = DeserializationState::Done;
        }

        self.packages.push(Rc::new(package));
        self.by_name.insert(name.to_ascii_lowercase(), id);
        self.roots.push(root);
        Ok(id)
    }

    /// Load the package called `name` through the provider, if it is not
    /// loaded already. Failures are logged and yield `None`.
    fn ensure_package(&mut self, name: &str, requesting: &str) -> Option<PackageId> {
        if let Some(id) = self.find_package(name) {
            return Some(id);
        }
        let key = name.to_ascii_lowercase();
        if self.loading.contains(&key) {
            return None;
        }
        let data = match self.provider.get_package(name, requesting) {
            Ok(Some(data)) => data,
            Ok(None) => {
                log::debug!("{}: package {} not found", requesting, name);
                return None;
            }
            Err(e) => {
                log::warn!("{}: failed to fetch package {}: {}", requesting, name, e);
                return None;
            }
        };
        self.loading.insert(key.clone());
        let result = self.load_package(name, data);
        self.loading.remove(&key);
        match result {
            Ok(id) => Some(id),
            Err(e) => {
                log::warn!("{}: failed to load package {}: {}", requesting, name, e);
                None
            }
        }
    }

    /// Resolve `index` in `package` to an object, constructing it on first use.
    pub fn index_to_object(
        &mut self,
        package: PackageId,
        index: PackageIndex,
    ) -> Result<Option<ObjectId>> {
        let pkg = self.package_rc(package)?;
        match pkg.check_index(index)? {
            IndexTarget::Null => Ok(None),
            IndexTarget::Export(slot) => self.export_object(package, &pkg, slot).map(Some),
            IndexTarget::Import(slot) => self.import_object(package, &pkg, slot).map(Some),
        }
    }

    fn construct_kind(&self, pkg: &Package, name: &Name, class_name: &Name) -> ObjectKind {
        let kind = self.registry.construct(&class_name.text);
        if kind.is_unknown() {
            log::warn!(
                "{}: class {} of {} is not registered; keeping an unknown object",
                pkg.name,
                class_name,
                name
            );
        }
        kind
    }

    fn export_object(&mut self, id: PackageId, pkg: &Rc<Package>, slot: usize) -> Result<ObjectId> {
        let item = pkg.export(slot)?;
        if let Some(existing) = item.object() {
            return Ok(existing);
        }

        let index = PackageIndex::from_export(slot);
        let name = pkg.name(item.object_name)?;
        let class_name = pkg.class_name(index)?;
        let kind = self.construct_kind(pkg, &name, &class_name);
        let mut object = Object::new(name, class_name, kind);
        object.package = Some(id);
        object.table_index = index;
        object.flags = ObjectFlags::from_bits_retain(item.object_flags);
        let object_id = self.container.add(object);
        // Registered before recursing so cycles end at this object.
        let _ = item.object_cell().set(object_id);

        let class = self.index_to_object(id, item.class_index)?;
        let outer = match self.index_to_object(id, item.outer_index)? {
            Some(outer) => Some(outer),
            None => self.roots.get(id).copied(),
        };
        let super_struct = self.index_to_object(id, item.super_index)?;
        let archetype = self.index_to_object(id, item.archetype_index)?;
        if let Some(object) = self.container.get_mut(object_id) {
            object.class = class;
            object.archetype = archetype;
            object.set_super(super_struct);
        }
        self.container.set_outer(object_id, outer);
        Ok(object_id)
    }

    fn import_object(&mut self, id: PackageId, pkg: &Rc<Package>, slot: usize) -> Result<ObjectId> {
        let item = pkg.import(slot)?;
        if let Some(existing) = item.object() {
            return Ok(existing);
        }

        let name = pkg.name(item.object_name)?;
        let class_name = pkg.name(item.class_name)?;
        if item.outer_index.is_null() {
            let root = self.package_object(&name);
            let _ = item.object_cell().set(root);
            return Ok(root);
        }

        let outer_name = pkg
            .object_name(item.outer_index)?
            .unwrap_or_else(|| Name::new("None"));
        if let Some(shared) = self.cross_reference(&name, &outer_name, &class_name) {
            let _ = item.object_cell().set(shared);
            return Ok(shared);
        }

        let owner = pkg.import_package_name(slot)?;
        if !owner.eq_str(&pkg.name) {
            if let Some(other) = self.ensure_package(&owner.text, &pkg.name) {
                if let Some(found) = self.find_export(other, &name, &outer_name, &class_name)? {
                    let _ = item.object_cell().set(found);
                    return Ok(found);
                }
            }
        }

        log::debug!(
            "{}: import {}.{} ({}) is unresolved; creating an imposter",
            pkg.name,
            outer_name,
            name,
            class_name
        );
        let kind = self.registry.construct(&class_name.text);
        let mut object = Object::new(name, class_name, kind);
        object.package = Some(id);
        object.table_index = PackageIndex::from_import(slot);
        object.state = DeserializationState::Imported;
        let object_id = self.container.add(object);
        let _ = item.object_cell().set(object_id);

        let outer = self.index_to_object(id, item.outer_index)?;
        self.container.set_outer(object_id, outer);
        Ok(object_id)
    }

    /// An object already in the container that matches name, outer name and class.
    fn cross_reference(&self, name: &Name, outer: &Name, class_name: &Name) -> Option<ObjectId> {
        self.container.find_all_by_outer(name, outer).find(|&id| {
            self.container
                .get(id)
                .map_or(false, |o| o.class_name == *class_name)
        })
    }

    fn find_export(
        &mut self,
        package: PackageId,
        name: &Name,
        outer: &Name,
        class_name: &Name,
    ) -> Result<Option<ObjectId>> {
        let pkg = self.package_rc(package)?;
        for (slot, export) in pkg.exports.iter().enumerate() {
            if !pkg.name(export.object_name)?.eq(name) {
                continue;
            }
            let index = PackageIndex::from_export(slot);
            if pkg.class_name(index)? != *class_name {
                continue;
            }
            let export_outer = match pkg.object_name(export.outer_index)? {
                Some(n) => n,
                None => Name::new(pkg.name.clone()),
            };
            if export_outer == *outer {
                return self.index_to_object(package, index);
            }
        }
        Ok(None)
    }

    fn package_object(&mut self, name: &Name) -> ObjectId {
        if let Some(root) = self.find_package(&name.text).and_then(|id| self.package_root(id)) {
            return root;
        }
        let existing = self.container.find_all(name).find(|&o| {
            self.container
                .get(o)
                .map_or(false, |o| o.outer.is_none() && matches!(o.kind, ObjectKind::Package))
        });
        match existing {
            Some(root) => root,
            None => {
                let mut object = Object::new(name.clone(), Name::new("Package"), ObjectKind::Package);
                object.state = DeserializationState::Imported;
                self.container.add(object)
            }
        }
    }

    /// Link every export of `package`.
    pub fn link_all(&mut self, package: PackageId) -> Result<Vec<ObjectId>> {
        let count = self.package_rc(package)?.exports.len();
        let mut objects = Vec::with_capacity(count);
        for slot in 0..count {
            if let Some(id) = self.index_to_object(package, PackageIndex::from_export(slot))? {
                objects.push(id);
            }
        }
        Ok(objects)
    }

    /// Decode the serialized fields of `id`. Failures are recorded on the
    /// object and logged; only a missing object is an error.
    pub fn deserialize(&mut self, id: ObjectId) -> Result<()> {
        let object = self
            .container
            .get(id)
            .ok_or_else(|| Error::format("environment", format!("no object {}", id)))?;
        if object.state != DeserializationState::Pending {
            return Ok(());
        }
        let (Some(package), IndexTarget::Export(slot)) = (object.package, object.table_index.resolve())
        else {
            return Ok(());
        };
        let mut working = object.clone();
        if let Some(object) = self.container.get_mut(id) {
            object.state = DeserializationState::InProgress;
        }

        let result = self.deserialize_export(package, slot, &mut working);
        let Some(object) = self.container.get_mut(id) else {
            return Ok(());
        };
        match result {
            Ok(()) => {
                object.kind = working.kind;
                object.state_frame = working.state_frame;
                object.net_index = working.net_index;
                object.properties = working.properties;
                object.state = DeserializationState::Done;
            }
            Err(e) => {
                log::warn!("failed to deserialize {} ({}): {}", object.name, object.class_name, e);
                object.state = DeserializationState::Failed(e.to_string());
                return Ok(());
            }
        }
        self.register_native(id)
    }

    fn deserialize_export(&mut self, package: PackageId, slot: usize, object: &mut Object) -> Result<()> {
        let pkg = self.package_rc(package)?;
        // Scoped copy of the export's bytes, released when decoding ends.
        let buffer = pkg.export_data(slot)?.to_vec();
        let mut ar = crate::archive::Archive::new(&buffer, pkg.summary.archive_version());
        let mut linking = Linking {
            env: self,
            package,
            pkg: Rc::clone(&pkg),
        };
        object.deserialize(&mut ar, &mut linking)?;
        if !ar.is_eof() {
            log::debug!(
                "{}: {} left {} of {} bytes unread",
                pkg.name,
                object.name,
                ar.remaining(),
                buffer.len()
            );
        }
        Ok(())
    }

    /// Child fields of a struct-like object in declaration order, each
    /// deserialized.
    pub fn children(&mut self, id: ObjectId) -> Result<Vec<ObjectId>> {
        self.deserialize(id)?;
        let mut cursor = self
            .container
            .get(id)
            .and_then(|o| o.kind.as_struct())
            .and_then(|s| s.children);
        let mut children = Vec::new();
        let mut seen = HashSet::new();
        while let Some(child) = cursor {
            if !seen.insert(child) || children.len() >= MAX_CHILDREN {
                log::warn!("child list of {} loops at {}", id, child);
                break;
            }
            self.deserialize(child)?;
            children.push(child);
            cursor = self
                .container
                .get(child)
                .and_then(|o| o.kind.field())
                .and_then(|f| f.next);
        }
        Ok(children)
    }

    /// Dotted path from the outermost object down to `id`.
    pub fn path_name(&self, id: ObjectId) -> String {
        let mut parts = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(object) = self.container.get(current) else {
                break;
            };
            parts.push(object.name.to_string());
            cursor = object.outer;
            if parts.len() > 64 {
                break;
            }
        }
        parts.reverse();
        parts.join(".")
    }

    /// Nearest enclosing class of `id`, or `id` itself if it is a class.
    pub fn owning_class(&self, id: ObjectId) -> Option<ObjectId> {
        let mut cursor = Some(id);
        let mut steps = 0;
        while let Some(current) = cursor {
            let object = self.container.get(current)?;
            if matches!(object.kind, ObjectKind::Class(_)) {
                return Some(current);
            }
            cursor = object.outer;
            steps += 1;
            if steps > 64 {
                break;
            }
        }
        None
    }

    /// Add a native function declared by `id` to the native cache.
    fn register_native(&mut self, id: ObjectId) -> Result<()> {
        let Some((native_index, flags, precedence, name)) = self.container.get(id).and_then(|o| {
            match &o.kind {
                ObjectKind::Function(f) if f.native_index != 0 => Some((
                    f.native_index,
                    f.function_flags,
                    f.operator_precedence,
                    f.friendly_name.clone().unwrap_or_else(|| o.name.clone()),
                )),
                _ => None,
            }
        }) else {
            return Ok(());
        };

        let format = if flags.contains(FunctionFlags::PRE_OPERATOR) {
            NativeFormat::PreOperator
        } else if flags.contains(FunctionFlags::OPERATOR) {
            let parms = self
                .children(id)?
                .into_iter()
                .filter(|&c| {
                    self.container.get(c).map_or(false, |o| match &o.kind {
                        ObjectKind::Property(p) => p.is_parm() && !p.is_return(),
                        _ => false,
                    })
                })
                .count();
            if parms == 1 {
                NativeFormat::PostOperator
            } else {
                NativeFormat::Operator
            }
        } else {
            NativeFormat::Function
        };

        let scope = self
            .owning_class(id)
            .and_then(|c| self.container.get(c))
            .map(|c| c.name.text.clone())
            .unwrap_or_default();
        log::debug!("native {:#x} {} in {}", native_index, name, scope);
        self.natives.register(
            &scope,
            NativeFunction::new(native_index, name.text, format, precedence),
        );
        Ok(())
    }

    /// Decompile the script of a function, state or class body.
    pub fn decompile_function(&mut self, id: ObjectId) -> Result<Decompiled> {
        self.deserialize(id)?;
        let object = self
            .container
            .get(id)
            .ok_or_else(|| Error::format("environment", format!("no object {}", id)))?;
        if let DeserializationState::Failed(msg) = &object.state {
            return Ok(Decompiled::failed(msg));
        }
        let Some(structure) = object.kind.as_struct() else {
            return Err(Error::format(
                "decompile",
                format!("{} ({}) has no script", object.name, object.class_name),
            ));
        };
        let Some(package) = object.package else {
            return Ok(Decompiled::default());
        };
        let pkg = self.package_rc(package)?;
        let scope = self
            .owning_class(id)
            .and_then(|c| self.container.get(c))
            .map(|c| c.name.text.clone());

        let ar = crate::archive::Archive::new(&structure.script, pkg.summary.archive_version());
        let script = read_script(
            ar,
            structure.script_memory_size,
            pkg.as_ref(),
            &self.natives,
            scope.as_deref(),
        );
        if let Some(e) = &script.error {
            log::warn!("{}: script stopped early: {}", self.path_name(id), e);
        }
        let mut decompiler = Decompiler::new(&script.tokens);
        if let Some(e) = &script.error {
            decompiler = decompiler.with_truncation(e);
        }
        Ok(decompiler.decompile())
    }

    /// Render the class `id` with its members as source text.
    pub fn write_class(&mut self, id: ObjectId) -> Result<String> {
        ClassWriter::new(self).write(id)
    }
}

/// Resolver handed to object deserializers; links indices in the package
/// being decoded.
struct Linking<'e> {
    env: &'e mut Environment,
    package: PackageId,
    pkg: Rc<Package>,
}

impl ObjectResolver for Linking<'_> {
    fn resolve(&mut self, index: PackageIndex) -> Result<Option<ObjectId>> {
        self.env.index_to_object(self.package, index)
    }

    fn name(&self, name: NameRef) -> Result<Name> {
        self.pkg.name(name)
    }
}
