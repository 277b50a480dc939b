//! The split, sharded, set-associative TLB.
//!
//! Layout: `[realm][granularity class][shard] -> 8 ways`. The D-stream
//! side is banked two ways by VPN parity, modeling the EV6 dual DTB; the
//! I-stream has a single bank. Entries are tagged with the global and
//! per-ASN epoch counters current at install time and are meaningful only
//! while both still match, which makes TBIA and TBIAP constant-time.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use es40_types::{Access, Mode, Realm};

use crate::pte::{PageSize, Pte};
use crate::replace::{ReplacementPolicy, WayState};
use crate::seqlock::SeqLock;

pub const SHARDS: usize = 16;
pub const WAYS: usize = 8;

const ASN_COUNT: usize = 256;

#[derive(Clone, Copy, Debug)]
pub struct TlbEntry {
    pub vpn: u64,
    pub pfn: u64,
    pub asn: u8,
    pub global: bool,
    pub size: PageSize,
    /// Low 16 PTE bits: fault-on and per-mode permission bits.
    pub perm_bits: u64,
    pub g_epoch: u64,
    pub a_epoch: u64,
    pub valid: bool,
}

impl Default for TlbEntry {
    fn default() -> TlbEntry {
        TlbEntry {
            vpn: 0,
            pfn: 0,
            asn: 0,
            global: false,
            size: PageSize::Size8K,
            perm_bits: 0,
            g_epoch: 0,
            a_epoch: 0,
            valid: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupResult {
    /// Translated physical address.
    Hit(u64),
    Miss,
    /// Permission failure for the requesting mode.
    Acv,
    /// PTE fault-on bit set for this access kind.
    FaultOn(Access),
}

struct Shard {
    ways: [SeqLock<TlbEntry>; WAYS],
    state: WayState,
    lock: Mutex<()>,
}

impl Shard {
    fn new(salt: u32) -> Shard {
        Shard {
            ways: std::array::from_fn(|_| SeqLock::new(TlbEntry::default())),
            state: WayState::new(salt),
            lock: Mutex::new(()),
        }
    }
}

struct ClassArray {
    shards: Vec<Shard>,
    /// Coverage hint: number of installs since the last full flush.
    /// Zero lets lookups skip the class without probing.
    population: AtomicU32,
}

impl ClassArray {
    fn new(salt: u32) -> ClassArray {
        ClassArray {
            shards: (0..SHARDS).map(|i| Shard::new(salt ^ i as u32)).collect(),
            population: AtomicU32::new(0),
        }
    }
}

struct Bank {
    classes: [ClassArray; 4],
}

impl Bank {
    fn new(salt: u32) -> Bank {
        Bank {
            classes: std::array::from_fn(|i| ClassArray::new(salt.wrapping_mul(31) ^ i as u32)),
        }
    }
}

pub struct Tlb {
    itb: Bank,
    dtb: [Bank; 2],
    /// Global epoch per realm: ITB_IA flushes the I-side without
    /// touching D-stream entries.
    g_epochs: [AtomicU64; 2],
    asn_epochs: Vec<AtomicU64>,
    policy: ReplacementPolicy,
    base_size: PageSize,
}

impl Tlb {
    pub fn new(policy: ReplacementPolicy, base_size: PageSize) -> Tlb {
        Tlb {
            itb: Bank::new(1),
            dtb: [Bank::new(2), Bank::new(3)],
            g_epochs: [AtomicU64::new(1), AtomicU64::new(1)],
            asn_epochs: (0..ASN_COUNT).map(|_| AtomicU64::new(1)).collect(),
            policy,
            base_size,
        }
    }

    pub fn base_page_size(&self) -> PageSize {
        self.base_size
    }

    fn bank(&self, realm: Realm, vpn: u64) -> &Bank {
        match realm {
            Realm::Instruction => &self.itb,
            Realm::Data => &self.dtb[(vpn & 1) as usize],
        }
    }

    fn shard_of(vpn: u64) -> usize {
        ((vpn ^ (vpn >> 5)) as usize) & (SHARDS - 1)
    }

    /// Probe for `va` in `realm` under `asn`, checking permissions for
    /// `(mode, access)` on a hit. Never blocks.
    pub fn lookup(
        &self,
        realm: Realm,
        va: u64,
        asn: u8,
        mode: Mode,
        access: Access,
    ) -> LookupResult {
        let ge = self.g_epochs[realm.index()].load(Ordering::Acquire);
        let ae = self.asn_epochs[asn as usize].load(Ordering::Acquire);
        for size in PageSize::ALL {
            let vpn = va >> size.shift();
            let bank = self.bank(realm, vpn);
            let class = &bank.classes[size.index()];
            if class.population.load(Ordering::Relaxed) == 0 {
                continue;
            }
            let shard = &class.shards[Self::shard_of(vpn)];
            for (w, way) in shard.ways.iter().enumerate() {
                let e = way.read();
                if !e.valid || e.vpn != vpn || e.size != size || e.g_epoch != ge {
                    continue;
                }
                if !e.global && (e.asn != asn || e.a_epoch != ae) {
                    continue;
                }
                let pte = Pte(e.perm_bits);
                if pte.fault_on(access) {
                    return LookupResult::FaultOn(access);
                }
                if !pte.allows(mode, access) {
                    return LookupResult::Acv;
                }
                shard.state.on_hit(self.policy, w);
                return LookupResult::Hit((e.pfn << size.shift()) | (va & (size.bytes() - 1)));
            }
        }
        LookupResult::Miss
    }

    /// Builds an entry from an in-memory PTE; epochs are stamped at
    /// install time.
    pub fn entry_from_pte(&self, va: u64, pte: Pte, asn: u8) -> TlbEntry {
        let size = PageSize::from_gh(self.base_size, pte.gh());
        TlbEntry {
            vpn: va >> size.shift(),
            pfn: pte.pfn(),
            asn,
            global: pte.global(),
            size,
            perm_bits: pte.0 & 0xFFFF,
            g_epoch: 0,
            a_epoch: 0,
            valid: true,
        }
    }

    /// Installs a translation, choosing a victim way per the configured
    /// replacement policy. An existing mapping for the same page is
    /// overwritten in place.
    pub fn install(&self, realm: Realm, mut entry: TlbEntry) {
        entry.g_epoch = self.g_epochs[realm.index()].load(Ordering::Acquire);
        entry.a_epoch = self.asn_epochs[entry.asn as usize].load(Ordering::Acquire);
        entry.valid = true;

        let bank = self.bank(realm, entry.vpn);
        let class = &bank.classes[entry.size.index()];
        let shard = &class.shards[Self::shard_of(entry.vpn)];
        let _guard = shard.lock.lock().unwrap();

        let mut target = None;
        // Same-page refill replaces in place.
        for (w, way) in shard.ways.iter().enumerate() {
            let e = way.read();
            if e.valid && e.vpn == entry.vpn && e.size == entry.size && e.asn == entry.asn {
                target = Some(w);
                break;
            }
        }
        // Otherwise any dead way (never filled, or staled by an epoch
        // bump) is free real estate.
        if target.is_none() {
            let ge = self.g_epochs[realm.index()].load(Ordering::Relaxed);
            for (w, way) in shard.ways.iter().enumerate() {
                let e = way.read();
                let stale = !e.valid
                    || e.g_epoch != ge
                    || (!e.global
                        && e.a_epoch != self.asn_epochs[e.asn as usize].load(Ordering::Relaxed));
                if stale {
                    target = Some(w);
                    break;
                }
            }
        }
        let w = target.unwrap_or_else(|| shard.state.victim(self.policy));
        shard.ways[w].update(|v| *v = entry);
        shard.state.on_install(self.policy, w);
        class.population.fetch_add(1, Ordering::Relaxed);
    }

    /// TBIA: all entries in the selected realm(s) become stale without
    /// scanning. `None` flushes both TLBs.
    pub fn invalidate_all(&self, realm: Option<Realm>) {
        let (flush_i, flush_d) = match realm {
            Some(Realm::Instruction) => (true, false),
            Some(Realm::Data) => (false, true),
            None => (true, true),
        };
        if flush_i {
            self.g_epochs[Realm::Instruction.index()].fetch_add(1, Ordering::AcqRel);
            for class in &self.itb.classes {
                class.population.store(0, Ordering::Relaxed);
            }
        }
        if flush_d {
            self.g_epochs[Realm::Data.index()].fetch_add(1, Ordering::AcqRel);
            for bank in [&self.dtb[0], &self.dtb[1]] {
                for class in &bank.classes {
                    class.population.store(0, Ordering::Relaxed);
                }
            }
        }
    }

    /// TBIAP: entries tagged with `asn` become stale; global entries
    /// survive.
    pub fn invalidate_asn(&self, asn: u8) {
        self.asn_epochs[asn as usize].fetch_add(1, Ordering::AcqRel);
    }

    /// TBIS: explicit scan of the buckets that could map `va`. Passing
    /// `None` for the realm hits both TLBs.
    pub fn invalidate_va(&self, realm: Option<Realm>, va: u64, asn: u8) {
        let realms: &[Realm] = match realm {
            Some(Realm::Instruction) => &[Realm::Instruction],
            Some(Realm::Data) => &[Realm::Data],
            None => &[Realm::Instruction, Realm::Data],
        };
        for &r in realms {
            for size in PageSize::ALL {
                let vpn = va >> size.shift();
                let banks: &[&Bank] = match r {
                    Realm::Instruction => &[&self.itb],
                    Realm::Data => &[&self.dtb[0], &self.dtb[1]],
                };
                for bank in banks {
                    let class = &bank.classes[size.index()];
                    if class.population.load(Ordering::Relaxed) == 0 {
                        continue;
                    }
                    let shard = &class.shards[Self::shard_of(vpn)];
                    let _guard = shard.lock.lock().unwrap();
                    for way in &shard.ways {
                        let e = way.read();
                        if e.valid && e.vpn == vpn && e.size == size && (e.global || e.asn == asn) {
                            way.update(|v| v.valid = false);
                        }
                    }
                }
            }
        }
    }
}
