//! Purpose: C ABI surface dnf5 resolves by symbol name when loading the plugin.
//! Exports: `dnf5_plugin_*` functions, `dnf5_plugin_instance`, `IPluginVTable`, `CommandVector`.
//! Role: Presents a `Plugin` trait object to the host as a C++ `dnf5::IPlugin` object.
//! Invariants: No panic crosses an exported function or vtable entry; construction faults become null.
//! Invariants: Instances are owned by the host and freed exactly once via `dnf5_plugin_delete_instance`.
//! Invariants: Instance layout follows the Itanium C++ ABI for `IPlugin` (plugin API 2.0):
//! Invariants: vptr at offset 0, `Context*` at offset one pointer, two destructor slots before the methods.
//! Notes: Method slots follow the declaration order in `dnf5/iplugin.hpp`; x86_64 and aarch64 Linux only.
#![allow(non_camel_case_types)]

use std::any::Any;
use std::ffi::{CStr, c_void};
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::{self, NonNull};

use crate::core::config::PluginConfig;
use crate::core::error::{Error, ErrorKind};
use crate::core::metadata::{
    ApplicationVersion, PLUGIN_NAME, PluginApiVersion, PluginVersion, Revision,
};
use crate::logging;
use crate::plugin::{Plugin, PrezPkglogPlugin};

/// Host context handle (`dnf5::Context&`). Never dereferenced by the plugin.
#[repr(C)]
pub struct dnf5_context {
    _private: [u8; 0],
}

/// `std::vector<std::unique_ptr<dnf5::Command>>` as laid out by libstdc++.
///
/// Larger than two registers, so both the C and the C++ ABI return it through the
/// hidden result pointer; declaring it as a by-value return matches the host's call.
#[repr(C)]
#[derive(Debug)]
pub struct CommandVector {
    start: *mut c_void,
    finish: *mut c_void,
    end_of_storage: *mut c_void,
}

impl CommandVector {
    pub const fn empty() -> Self {
        Self {
            start: ptr::null_mut(),
            finish: ptr::null_mut(),
            end_of_storage: ptr::null_mut(),
        }
    }

    pub fn len(&self) -> usize {
        (self.finish as usize - self.start as usize) / size_of::<*mut c_void>()
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.finish
    }
}

/// Virtual function table of `dnf5::IPlugin`, in slot order.
#[repr(C)]
pub struct IPluginVTable {
    pub complete_dtor: extern "C" fn(*mut dnf5_plugin_instance),
    pub deleting_dtor: extern "C" fn(*mut dnf5_plugin_instance),
    pub get_api_version: extern "C" fn(*const dnf5_plugin_instance) -> PluginApiVersion,
    pub get_name: extern "C" fn(*const dnf5_plugin_instance) -> *const c_char,
    pub get_version: extern "C" fn(*const dnf5_plugin_instance) -> PluginVersion,
    pub get_attributes: extern "C" fn(*const dnf5_plugin_instance) -> *const *const c_char,
    pub get_attribute:
        extern "C" fn(*const dnf5_plugin_instance, *const c_char) -> *const c_char,
    pub init: extern "C" fn(*mut dnf5_plugin_instance),
    pub create_commands: extern "C" fn(*mut dnf5_plugin_instance) -> CommandVector,
    pub finish: extern "C" fn(*mut dnf5_plugin_instance),
}

// Itanium vtable group: offset-to-top and RTTI precede the address the vptr holds.
#[repr(C)]
struct VTableGroup {
    offset_to_top: isize,
    type_info: usize,
    slots: IPluginVTable,
}

static VTABLE: VTableGroup = VTableGroup {
    offset_to_top: 0,
    type_info: 0,
    slots: IPluginVTable {
        complete_dtor: instance_complete_dtor,
        deleting_dtor: instance_deleting_dtor,
        get_api_version: instance_get_api_version,
        get_name: instance_get_name,
        get_version: instance_get_version,
        get_attributes: instance_get_attributes,
        get_attribute: instance_get_attribute,
        init: instance_init,
        create_commands: instance_create_commands,
        finish: instance_finish,
    },
};

#[repr(C)]
pub struct dnf5_plugin_instance {
    pub vtable: &'static IPluginVTable,
    // `IPlugin::context`; read by the host's inline `get_context()`.
    context: NonNull<dnf5_context>,
    plugin: Box<dyn Plugin>,
    // Null-terminated copy of `Plugin::attributes`, empty when none are declared.
    attribute_ptrs: Vec<*const c_char>,
}

const _: () = {
    assert!(std::mem::offset_of!(dnf5_plugin_instance, vtable) == 0);
    assert!(std::mem::offset_of!(dnf5_plugin_instance, context) == size_of::<usize>());
    assert!(std::mem::offset_of!(VTableGroup, slots) == 2 * size_of::<usize>());
    assert!(std::mem::offset_of!(IPluginVTable, get_api_version) == 2 * size_of::<usize>());
    assert!(std::mem::offset_of!(IPluginVTable, finish) == 9 * size_of::<usize>());
    assert!(size_of::<CommandVector>() == 3 * size_of::<usize>());
};

impl dnf5_plugin_instance {
    /// Wraps a plugin in a host-owned instance. Release with `dnf5_plugin_delete_instance`.
    pub fn into_raw(
        context: NonNull<dnf5_context>,
        plugin: Box<dyn Plugin>,
    ) -> *mut dnf5_plugin_instance {
        let attributes = plugin.attributes();
        let attribute_ptrs = if attributes.is_empty() {
            Vec::new()
        } else {
            attributes
                .iter()
                .map(|attr| attr.as_ptr())
                .chain(std::iter::once(ptr::null()))
                .collect()
        };
        Box::into_raw(Box::new(dnf5_plugin_instance {
            vtable: &VTABLE.slots,
            context,
            plugin,
            attribute_ptrs,
        }))
    }

    pub fn context(&self) -> NonNull<dnf5_context> {
        self.context
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn dnf5_plugin_get_api_version() -> PluginApiVersion {
    logging::init_from_env();
    Revision::active().api_version()
}

#[unsafe(no_mangle)]
pub extern "C" fn dnf5_plugin_get_name() -> *const c_char {
    PLUGIN_NAME.as_ptr()
}

#[unsafe(no_mangle)]
pub extern "C" fn dnf5_plugin_get_version() -> PluginVersion {
    Revision::active().version()
}

#[unsafe(no_mangle)]
pub extern "C" fn dnf5_plugin_new_instance(
    application_version: ApplicationVersion,
    context: *mut dnf5_context,
) -> *mut dnf5_plugin_instance {
    logging::init_from_env();
    tracing::debug!(%application_version, "dnf5_plugin_new_instance");
    let built = construct(context, |context| {
        Box::new(PrezPkglogPlugin::new(
            context,
            application_version,
            PluginConfig::resolve(),
        ))
    });
    match built {
        Ok(instance) => instance,
        Err(err) => {
            tracing::error!(error = %err, "failed to create plugin instance");
            ptr::null_mut()
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn dnf5_plugin_delete_instance(instance: *mut dnf5_plugin_instance) {
    instance_deleting_dtor(instance);
}

fn construct(
    context: *mut dnf5_context,
    build: impl FnOnce(NonNull<dnf5_context>) -> Box<dyn Plugin>,
) -> Result<*mut dnf5_plugin_instance, Error> {
    let context = NonNull::new(context)
        .ok_or_else(|| Error::new(ErrorKind::Usage).with_message("context is null"))?;
    let plugin = panic::catch_unwind(AssertUnwindSafe(|| build(context))).map_err(|payload| {
        Error::new(ErrorKind::Instantiation).with_message(format!(
            "plugin constructor panicked: {}",
            panic_message(payload.as_ref())
        ))
    })?;
    Ok(dnf5_plugin_instance::into_raw(context, plugin))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

/// Runs `f` against a live instance, returning `fallback` for null pointers or panics.
fn with_instance<R>(
    instance: *const dnf5_plugin_instance,
    op: &'static str,
    fallback: R,
    f: impl FnOnce(&dnf5_plugin_instance) -> R,
) -> R {
    if instance.is_null() {
        tracing::warn!(op, "called with null instance");
        return fallback;
    }
    let instance = unsafe { &*instance };
    match panic::catch_unwind(AssertUnwindSafe(|| f(instance))) {
        Ok(value) => value,
        Err(payload) => {
            tracing::error!(op, panic = panic_message(payload.as_ref()), "plugin panicked");
            fallback
        }
    }
}

fn with_instance_mut<R>(
    instance: *mut dnf5_plugin_instance,
    op: &'static str,
    fallback: R,
    f: impl FnOnce(&mut dnf5_plugin_instance) -> R,
) -> R {
    if instance.is_null() {
        tracing::warn!(op, "called with null instance");
        return fallback;
    }
    let instance = unsafe { &mut *instance };
    match panic::catch_unwind(AssertUnwindSafe(|| f(instance))) {
        Ok(value) => value,
        Err(payload) => {
            tracing::error!(op, panic = panic_message(payload.as_ref()), "plugin panicked");
            fallback
        }
    }
}

// Drops the instance in place; the caller owns the storage.
extern "C" fn instance_complete_dtor(instance: *mut dnf5_plugin_instance) {
    if instance.is_null() {
        return;
    }
    let dropped = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
        ptr::drop_in_place(instance);
    }));
    if let Err(payload) = dropped {
        tracing::error!(panic = panic_message(payload.as_ref()), "plugin drop panicked");
    }
}

extern "C" fn instance_deleting_dtor(instance: *mut dnf5_plugin_instance) {
    if instance.is_null() {
        return;
    }
    let dropped = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
        drop(Box::from_raw(instance));
    }));
    if let Err(payload) = dropped {
        tracing::error!(panic = panic_message(payload.as_ref()), "plugin drop panicked");
    }
}

extern "C" fn instance_get_api_version(instance: *const dnf5_plugin_instance) -> PluginApiVersion {
    with_instance(instance, "get_api_version", Revision::active().api_version(), |it| {
        it.plugin.api_version()
    })
}

extern "C" fn instance_get_name(instance: *const dnf5_plugin_instance) -> *const c_char {
    with_instance(instance, "get_name", PLUGIN_NAME.as_ptr(), |it| {
        it.plugin.name().as_ptr()
    })
}

extern "C" fn instance_get_version(instance: *const dnf5_plugin_instance) -> PluginVersion {
    with_instance(instance, "get_version", Revision::active().version(), |it| {
        it.plugin.version()
    })
}

extern "C" fn instance_get_attributes(
    instance: *const dnf5_plugin_instance,
) -> *const *const c_char {
    with_instance(instance, "get_attributes", ptr::null(), |it| {
        if it.attribute_ptrs.is_empty() {
            ptr::null()
        } else {
            it.attribute_ptrs.as_ptr()
        }
    })
}

extern "C" fn instance_get_attribute(
    instance: *const dnf5_plugin_instance,
    name: *const c_char,
) -> *const c_char {
    if name.is_null() {
        return ptr::null();
    }
    let Ok(name) = unsafe { CStr::from_ptr(name) }.to_str() else {
        return ptr::null();
    };
    with_instance(instance, "get_attribute", ptr::null(), |it| {
        it.plugin
            .attribute(name)
            .map(|value| value.as_ptr())
            .unwrap_or(ptr::null())
    })
}

// Rust commands cannot be handed to the host as C++ objects, so the host always
// receives an empty vector.
extern "C" fn instance_create_commands(instance: *mut dnf5_plugin_instance) -> CommandVector {
    with_instance_mut(instance, "create_commands", CommandVector::empty(), |it| {
        for command in it.plugin.create_commands() {
            tracing::warn!(command = command.name(), "command not registered with host");
        }
        CommandVector::empty()
    })
}

extern "C" fn instance_init(instance: *mut dnf5_plugin_instance) {
    with_instance_mut(instance, "init", (), |it| it.plugin.init());
}

extern "C" fn instance_finish(instance: *mut dnf5_plugin_instance) {
    with_instance_mut(instance, "finish", (), |it| it.plugin.finish());
}
