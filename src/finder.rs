//! NDI source discovery.

use std::{
    ffi::{CStr, CString},
    marker::PhantomData,
    ptr,
    time::Duration,
};

use crate::{discovery::SourceSet, ndi_lib::*, timeout_ms, transport::Source, Error, Result, NDI};

/// Configuration for NDI source discovery.
///
/// ```
/// use ndi_viewer::FinderOptions;
///
/// let options = FinderOptions::builder()
///     .groups("Public,Studio")
///     .extra_ips("192.168.1.20")
///     .build();
/// assert!(options.show_local_sources);
/// ```
#[derive(Debug, Clone)]
pub struct FinderOptions {
    /// Whether sources running on this machine are listed.
    pub show_local_sources: bool,
    /// Comma-separated list of groups to search (e.g., "Public,Private").
    pub groups: Option<String>,
    /// Additional IP addresses to query directly, comma separated.
    pub extra_ips: Option<String>,
}

impl Default for FinderOptions {
    fn default() -> Self {
        FinderOptionsBuilder::default().build()
    }
}

impl FinderOptions {
    pub fn builder() -> FinderOptionsBuilder {
        FinderOptionsBuilder::default()
    }
}

/// Builder for [`FinderOptions`]; local sources are shown unless disabled.
#[derive(Debug, Default, Clone)]
pub struct FinderOptionsBuilder {
    show_local_sources: Option<bool>,
    groups: Option<String>,
    extra_ips: Option<String>,
}

impl FinderOptionsBuilder {
    #[must_use]
    pub fn show_local_sources(mut self, show: bool) -> Self {
        self.show_local_sources = Some(show);
        self
    }

    #[must_use]
    pub fn groups<S: Into<String>>(mut self, groups: S) -> Self {
        self.groups = Some(groups.into());
        self
    }

    #[must_use]
    pub fn extra_ips<S: Into<String>>(mut self, ips: S) -> Self {
        self.extra_ips = Some(ips.into());
        self
    }

    #[must_use]
    pub fn build(self) -> FinderOptions {
        FinderOptions {
            show_local_sources: self.show_local_sources.unwrap_or(true),
            groups: self.groups,
            extra_ips: self.extra_ips,
        }
    }
}

/// Live view of the NDI sources on the network.
///
/// The SDK keeps the list current on its own threads; [`SourceSet`] exposes
/// change notifications and snapshots of it.
pub struct Finder<'a> {
    instance: NDIlib_find_instance_t,
    // The SDK may keep reading these for the finder's lifetime.
    _groups: Option<CString>,
    _extra_ips: Option<CString>,
    ndi: PhantomData<&'a NDI>,
}

impl<'a> Finder<'a> {
    /// # Errors
    ///
    /// Fails if an option contains a NUL byte or the SDK refuses to create
    /// the finder.
    pub fn new(_ndi: &'a NDI, options: &FinderOptions) -> Result<Self> {
        let groups = options.groups.as_deref().map(CString::new).transpose()?;
        let extra_ips = options.extra_ips.as_deref().map(CString::new).transpose()?;

        let create = NDIlib_find_create_t {
            show_local_sources: options.show_local_sources,
            p_groups: groups.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
            p_extra_ips: extra_ips.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
        };

        let instance = unsafe { NDIlib_find_create_v2(&create) };
        if instance.is_null() {
            return Err(Error::InitializationFailed(
                "NDIlib_find_create_v2 failed".into(),
            ));
        }

        Ok(Self {
            instance,
            _groups: groups,
            _extra_ips: extra_ips,
            ndi: PhantomData,
        })
    }

    /// Snapshot of the currently known sources, without further discovery.
    pub fn sources(&self) -> Result<Vec<Source>> {
        let mut count = 0u32;
        let sources_ptr = unsafe { NDIlib_find_get_current_sources(self.instance, &mut count) };
        if sources_ptr.is_null() {
            return Ok(vec![]);
        }

        (0..count as usize)
            .map(|i| {
                // SAFETY: the SDK returned `count` entries, valid until the next
                // call on this finder.
                let raw = unsafe { &*sources_ptr.add(i) };
                source_from_raw(raw)
            })
            .collect()
    }
}

fn source_from_raw(raw: &NDIlib_source_t) -> Result<Source> {
    if raw.p_ndi_name.is_null() {
        return Err(Error::NullPointer("NDIlib_source_t::p_ndi_name".into()));
    }
    let name = unsafe { CStr::from_ptr(raw.p_ndi_name) }
        .to_string_lossy()
        .into_owned();
    Ok(Source::new(name))
}

impl SourceSet for Finder<'_> {
    fn wait_for_change(&self, timeout: Duration) -> bool {
        unsafe { NDIlib_find_wait_for_sources(self.instance, timeout_ms(timeout)) }
    }

    fn current(&self) -> Result<Vec<Source>> {
        self.sources()
    }
}

impl Drop for Finder<'_> {
    fn drop(&mut self) {
        unsafe { NDIlib_find_destroy(self.instance) };
    }
}

/// # Safety
///
/// The SDK's find functions are thread-safe and the struct only holds the
/// opaque instance pointer plus the strings it was created with.
unsafe impl Send for Finder<'_> {}

/// # Safety
///
/// See the `Send` impl; the SDK synchronizes access to the instance internally.
unsafe impl Sync for Finder<'_> {}
