//! Property tests: record encoding and partition placement.

mod common;

use proptest::prelude::*;

use common::{scratch_disk, KIB};
use vdisk::codec::{from_bytes, name_to_bytes, to_bytes};
use vdisk::layout::{
    Ebr, FileBlock, FolderBlock, FolderEntry, Inode, InodeType, Mbr, Partition,
    PartitionStatus, SuperBlock, BLOCK_SIZE, NONE,
};
use vdisk::{create_partition, logical_partitions, Fit, PartitionType};

fn fit() -> impl Strategy<Value = Fit> {
    prop_oneof![Just(Fit::Best), Just(Fit::First), Just(Fit::Worst)]
}

fn status() -> impl Strategy<Value = PartitionStatus> {
    prop_oneof![
        Just(PartitionStatus::Free),
        Just(PartitionStatus::Occupied),
        Just(PartitionStatus::Mounted)
    ]
}

fn pointer() -> impl Strategy<Value = i32> {
    prop_oneof![Just(NONE), 0..i32::MAX]
}

/// Whole seconds keep the timestamps exact in an `f32`.
fn timestamp() -> impl Strategy<Value = f32> {
    (0u32..16_000_000).prop_map(|s| s as f32)
}

/// Names at the full field width as well as shorter ones.
fn slot_name() -> impl Strategy<Value = [u8; 16]> {
    prop_oneof!["[A-Za-z0-9]{16}", "[A-Za-z0-9_]{1,15}"]
        .prop_map(|n| name_to_bytes::<16>(&n).unwrap())
}

fn partition() -> impl Strategy<Value = Partition> {
    let live = (
        status(),
        prop_oneof![Just(PartitionType::Primary), Just(PartitionType::Extended)],
        fit(),
        0..i32::MAX,
        0..i32::MAX,
        slot_name(),
        1..5i32,
        "[0-9]{2}[1-9][A-Z]",
    )
        .prop_map(|(status, kind, fit, start, size, name, correlative, id)| Partition {
            status,
            kind: Some(kind),
            fit: Some(fit),
            start,
            size,
            name,
            correlative,
            id: name_to_bytes::<4>(&id).unwrap(),
        });
    prop_oneof![Just(Partition::empty()), live]
}

proptest! {
    #[test]
    fn mbr_encoding_is_stable(
        size in 0..i32::MAX,
        created in timestamp(),
        signature in any::<i32>(),
        fit in fit(),
        partitions in proptest::array::uniform4(partition()),
    ) {
        let mbr = Mbr { size, created, signature, fit, partitions };
        let raw = to_bytes(&mbr);
        prop_assert_eq!(raw.len(), 153);
        let back: Mbr = from_bytes(&raw).unwrap();
        prop_assert_eq!(back.partitions().count(), partitions.iter().filter(|p| p.start != NONE).count());
        prop_assert_eq!(back, mbr);
    }

    #[test]
    fn superblock_encoding_is_stable(
        counts in proptest::array::uniform5(0..i32::MAX),
        times in (timestamp(), timestamp()),
        mnt_count in 0..1000i32,
        starts in proptest::array::uniform6(prop_oneof![Just(NONE), 0..i32::MAX]),
    ) {
        let sb = SuperBlock {
            filesystem_type: counts[0] % 4,
            inodes_count: counts[1],
            blocks_count: counts[2],
            free_inodes_count: counts[3],
            free_blocks_count: counts[4],
            mtime: times.0,
            umtime: times.1,
            mnt_count,
            magic: 0xEF53,
            inode_size: 88,
            block_size: 64,
            first_ino: starts[0],
            first_blo: starts[1],
            bm_inode_start: starts[2],
            bm_block_start: starts[3],
            inode_start: starts[4],
            block_start: starts[5],
        };
        let raw = to_bytes(&sb);
        prop_assert_eq!(raw.len(), 68);
        let back: SuperBlock = from_bytes(&raw).unwrap();
        prop_assert_eq!(back, sb);
    }

    #[test]
    fn file_block_keeps_content(body in proptest::collection::vec(1u8..=255, 0..=BLOCK_SIZE)) {
        let block = FileBlock::from_slice(&body);
        let raw = to_bytes(&block);
        prop_assert_eq!(raw.len(), BLOCK_SIZE);
        let back: FileBlock = from_bytes(&raw).unwrap();
        prop_assert_eq!(back.bytes(), &body[..]);
        prop_assert_eq!(back, block);
    }

    #[test]
    fn partition_encoding_is_stable(
        status in status(),
        fit in proptest::option::of(fit()),
        extended in any::<bool>(),
        start in pointer(),
        size in pointer(),
        name in proptest::array::uniform16(any::<u8>()),
        correlative in pointer(),
        id in proptest::array::uniform4(any::<u8>()),
    ) {
        let kind = Some(if extended { PartitionType::Extended } else { PartitionType::Primary });
        let p = Partition { status, kind, fit, start, size, name, correlative, id };
        let back: Partition = from_bytes(&to_bytes(&p)).unwrap();
        prop_assert_eq!(back, p);
    }

    #[test]
    fn ebr_encoding_is_stable(
        fit in proptest::option::of(fit()),
        start in pointer(),
        size in pointer(),
        next in pointer(),
        name in "[A-Za-z0-9]{0,16}",
    ) {
        let mut raw = [0u8; 16];
        raw[..name.len()].copy_from_slice(name.as_bytes());
        let ebr = Ebr { mount: PartitionStatus::Occupied, fit, start, size, next, name: raw };
        let back: Ebr = from_bytes(&to_bytes(&ebr)).unwrap();
        prop_assert_eq!(back.name(), name);
        prop_assert_eq!(back, ebr);
    }

    #[test]
    fn inode_encoding_is_stable(
        uid in any::<i32>(),
        size in 0..960i32,
        used in 0..=15usize,
        folder in any::<bool>(),
        mtime in 0u32..2_000_000_000,
    ) {
        let mut inode = Inode::new(
            if folder { InodeType::Folder } else { InodeType::File },
            *b"664",
        );
        inode.uid = uid;
        inode.size = size;
        inode.mtime = mtime as f32;
        for i in 0..used {
            inode.block[i] = i as i32 * 3;
        }
        let back: Inode = from_bytes(&to_bytes(&inode)).unwrap();
        prop_assert_eq!(back.blocks().count(), used);
        prop_assert_eq!(back, inode);
    }

    #[test]
    fn folder_entries_keep_names(a in "[a-z.]{1,12}", b in "[a-z_]{1,12}", ia in 0..5000i32) {
        let mut block = FolderBlock::new(7, 3);
        block.entries[2] = FolderEntry::new(&a, ia).unwrap();
        block.entries[3] = FolderEntry::new(&b, NONE).unwrap();
        let back: FolderBlock = from_bytes(&to_bytes(&block)).unwrap();
        prop_assert_eq!(back.entries[2].name(), a);
        prop_assert_eq!(back.children().count(), 1);
        prop_assert_eq!(back, block);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn partitions_never_overlap(requests in proptest::collection::vec((1..24i32, 0..3u8), 1..10)) {
        let (_dir, disk) = scratch_disk(64 * KIB);
        for (i, (kib, kind)) in requests.iter().enumerate() {
            let kind = match kind {
                0 => PartitionType::Primary,
                1 => PartitionType::Extended,
                _ => PartitionType::Logical,
            };
            // failures (no room, no extended, second extended) are expected
            let _ = create_partition(&disk, kib * KIB, kind, Fit::First, &format!("p{}", i));
        }

        let mbr = vdisk::disk::read_mbr(&disk).unwrap();
        let live: Vec<&Partition> = mbr.partitions().collect();
        prop_assert!(live.iter().filter(|p| p.kind == Some(PartitionType::Extended)).count() <= 1);
        for p in &live {
            prop_assert!(p.start as usize >= 153);
            prop_assert!(p.end() <= mbr.size as i64);
        }
        for (i, a) in live.iter().enumerate() {
            for b in &live[i + 1..] {
                prop_assert!(a.end() <= b.start as i64 || b.end() <= a.start as i64);
            }
        }

        if let Some(ext) = mbr.extended() {
            let chain = logical_partitions(&disk).unwrap();
            for e in &chain {
                prop_assert!(e.start >= ext.start && e.end() <= ext.end());
            }
            for w in chain.windows(2) {
                prop_assert!(w[0].end() <= w[1].start as i64);
            }
        }
    }
}
