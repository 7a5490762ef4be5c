use std::collections::BTreeMap;

use deepdive_common::ProfileType;

use crate::canonical::is_link_aggregator;

/// Where an accepted URL would land in its type's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Append,
    Replace(usize),
}

/// Accepted canonical URLs per profile type, each list bounded to `cap`.
///
/// Full website lists make room by evicting link-in-bio hubs: a trusted
/// website seed always wins a slot, an ordinary website only displaces a hub,
/// and a hub never displaces anything.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMap {
    cap: usize,
    links: BTreeMap<ProfileType, Vec<String>>,
}

impl CandidateMap {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            links: ProfileType::ALL.into_iter().map(|t| (t, Vec::new())).collect(),
        }
    }

    pub fn get(&self, profile_type: ProfileType) -> &[String] {
        self.links
            .get(&profile_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, profile_type: ProfileType, url: &str) -> bool {
        self.get(profile_type).iter().any(|u| u == url)
    }

    /// Whether `try_insert` could place `url`. Lets callers skip validation
    /// for candidates that have nowhere to go.
    pub fn admits(&self, profile_type: ProfileType, url: &str, trusted_seed: bool) -> bool {
        !self.contains(profile_type, url) && self.slot_for(profile_type, url, trusted_seed).is_some()
    }

    /// Insert an accepted URL. Returns false when it is already present or the
    /// type's slots are full and eviction does not apply.
    pub fn try_insert(&mut self, profile_type: ProfileType, url: &str, trusted_seed: bool) -> bool {
        if self.contains(profile_type, url) {
            return false;
        }
        let Some(slot) = self.slot_for(profile_type, url, trusted_seed) else {
            return false;
        };
        let urls = self.links.entry(profile_type).or_default();
        match slot {
            Slot::Append => urls.push(url.to_string()),
            Slot::Replace(index) => urls[index] = url.to_string(),
        }
        true
    }

    fn slot_for(&self, profile_type: ProfileType, url: &str, trusted_seed: bool) -> Option<Slot> {
        let urls = self.get(profile_type);
        if urls.len() < self.cap {
            return Some(Slot::Append);
        }
        if self.cap == 0 || profile_type != ProfileType::Website {
            return None;
        }

        let first_hub = urls.iter().position(|u| is_link_aggregator(u));
        if trusted_seed {
            return Some(Slot::Replace(first_hub.unwrap_or(0)));
        }
        if is_link_aggregator(url) {
            return None;
        }
        first_hub.map(Slot::Replace)
    }

    /// All (type, url) pairs in type order.
    pub fn pairs(&self) -> impl Iterator<Item = (ProfileType, &str)> {
        self.links
            .iter()
            .flat_map(|(t, urls)| urls.iter().map(move |u| (*t, u.as_str())))
    }

    pub fn len(&self) -> usize {
        self.links.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Types with at least one accepted URL, in type order.
    pub fn found_types(&self) -> Vec<ProfileType> {
        self.links
            .iter()
            .filter(|(_, urls)| !urls.is_empty())
            .map(|(t, _)| *t)
            .collect()
    }

    pub fn first(&self, profile_type: ProfileType) -> Option<&str> {
        self.get(profile_type).first().map(String::as_str)
    }

    pub fn to_map(&self) -> BTreeMap<ProfileType, Vec<String>> {
        self.links.clone()
    }
}
