//! End-to-end tests against synthetic, hand-built archives: no fixture
//! downloads, no external `unsquashfs` binary, just the public read-path
//! API exercised the way a consumer crate would use it.

use deku::DekuContainerWrite;
use sqshcore::inode::pack_ref;
use sqshcore::superblock::{SuperBlock, MAGIC, NOT_SET};
use sqshcore::{easy_directory_list, easy_file_content, easy_file_exists, Archive, Compressor, TraversalState, TreeTraversal};

/// root
///  |- a (regular file, "hello world", one block, uncompressed)
///  `- sub/ (directory)
///      `- b (regular file, "nested", one block, uncompressed)
///
/// Everything lives in a single inode metablock and a single directory
/// metablock, so inode/directory byte offsets below are plain constants:
/// inode table holds `a`(36B), `sub`(32B), `b`(36B), `root`(32B) back to
/// back at offsets 0/36/68/104; the directory metablock holds root's
/// listing (32B) followed by sub's listing (21B) at offset 32.
fn build_nested_archive() -> Vec<u8> {
    const A_INODE_OFFSET: u16 = 0;
    const SUB_INODE_OFFSET: u16 = 36;
    const B_INODE_OFFSET: u16 = 68;
    const ROOT_INODE_OFFSET: u16 = 104;
    const SUB_DIR_OFFSET: u16 = 32;

    let block_size: u32 = 4096;
    let block_log: u16 = 12;
    let blocks_start = 96u64;

    let mut a_block = b"hello world".to_vec();
    a_block.resize(11, 0);
    let mut b_block = b"nested".to_vec();
    b_block.resize(6, 0);
    let a_block_offset = blocks_start;
    let b_block_offset = blocks_start + a_block.len() as u64;

    let file_inode = |inode_number: u32, block_start: u64, size: usize| {
        let mut b = Vec::new();
        b.extend_from_slice(&2u16.to_le_bytes()); // InodeId::BasicFile
        b.extend_from_slice(&0o644u16.to_le_bytes()); // permissions
        b.extend_from_slice(&0u16.to_le_bytes()); // uid
        b.extend_from_slice(&0u16.to_le_bytes()); // gid
        b.extend_from_slice(&0u32.to_le_bytes()); // mtime
        b.extend_from_slice(&inode_number.to_le_bytes());
        b.extend_from_slice(&(block_start as u32).to_le_bytes()); // blocks_start
        b.extend_from_slice(&u32::MAX.to_le_bytes()); // frag_index = NO_FRAGMENT
        b.extend_from_slice(&0u32.to_le_bytes()); // block_offset (fragment)
        b.extend_from_slice(&(size as u32).to_le_bytes()); // file_size
        let raw = (size as u32) | (1 << 24); // uncompressed, whole block
        b.extend_from_slice(&raw.to_le_bytes());
        assert_eq!(b.len(), 36);
        b
    };

    let dir_inode = |inode_number: u32, parent_inode: u32, block_offset: u16, payload_len: usize| {
        let mut b = Vec::new();
        b.extend_from_slice(&1u16.to_le_bytes()); // InodeId::BasicDirectory
        b.extend_from_slice(&0o755u16.to_le_bytes());
        b.extend_from_slice(&0u16.to_le_bytes());
        b.extend_from_slice(&0u16.to_le_bytes());
        b.extend_from_slice(&0u32.to_le_bytes());
        b.extend_from_slice(&inode_number.to_le_bytes());
        b.extend_from_slice(&0u32.to_le_bytes()); // block_index (single directory metablock)
        b.extend_from_slice(&1u32.to_le_bytes()); // link_count
        b.extend_from_slice(&((payload_len as u16) + 3).to_le_bytes()); // file_size
        b.extend_from_slice(&block_offset.to_le_bytes());
        b.extend_from_slice(&parent_inode.to_le_bytes());
        assert_eq!(b.len(), 32);
        b
    };

    let dir_entry = |offset: u16, inode_delta: i16, entry_type: u16, name: &[u8]| {
        let mut b = Vec::new();
        b.extend_from_slice(&offset.to_le_bytes());
        b.extend_from_slice(&inode_delta.to_le_bytes());
        b.extend_from_slice(&entry_type.to_le_bytes());
        b.extend_from_slice(&((name.len() - 1) as u16).to_le_bytes());
        b.extend_from_slice(name);
        b
    };

    let dir_header = |count: u32, inode_block_start: u32, inode_base: u32| {
        let mut b = Vec::new();
        b.extend_from_slice(&(count - 1).to_le_bytes());
        b.extend_from_slice(&inode_block_start.to_le_bytes());
        b.extend_from_slice(&inode_base.to_le_bytes());
        b
    };

    // root lists "a" (inode 2) and "sub" (inode 3), base inode number 2
    let mut root_dir_payload = dir_header(2, 0, 2);
    root_dir_payload.extend(dir_entry(A_INODE_OFFSET, 0, 2, b"a"));
    root_dir_payload.extend(dir_entry(SUB_INODE_OFFSET, 1, 1, b"sub"));
    assert_eq!(root_dir_payload.len(), 32);

    // sub lists "b" (inode 4), base inode number 4
    let mut sub_dir_payload = dir_header(1, 0, 4);
    sub_dir_payload.extend(dir_entry(B_INODE_OFFSET, 0, 2, b"b"));
    assert_eq!(sub_dir_payload.len(), 21);

    let mut dir_payload = root_dir_payload.clone();
    dir_payload.extend(sub_dir_payload);

    let mut inode_payload = Vec::new();
    inode_payload.extend(file_inode(2, a_block_offset, a_block.len()));
    inode_payload.extend(dir_inode(3, 1, SUB_DIR_OFFSET, 21));
    inode_payload.extend(file_inode(4, b_block_offset, b_block.len()));
    inode_payload.extend(dir_inode(1, 1, 0, root_dir_payload.len()));
    assert_eq!(inode_payload.len(), ROOT_INODE_OFFSET as usize + 32);

    let inode_header = (inode_payload.len() as u16) | (1 << 15);
    let mut inode_table = inode_header.to_le_bytes().to_vec();
    inode_table.extend_from_slice(&inode_payload);

    let dir_table_header = (dir_payload.len() as u16) | (1 << 15);
    let mut directory_table = dir_table_header.to_le_bytes().to_vec();
    directory_table.extend_from_slice(&dir_payload);

    let mut archive = vec![0u8; blocks_start as usize];
    archive.extend_from_slice(&a_block);
    archive.extend_from_slice(&b_block);

    let inode_table_start = archive.len() as u64;
    archive.extend_from_slice(&inode_table);
    let directory_table_start = archive.len() as u64;
    archive.extend_from_slice(&directory_table);

    let root_inode_ref = pack_ref(0, ROOT_INODE_OFFSET);

    let sb = SuperBlock {
        magic: MAGIC,
        inode_count: 4,
        mod_time: 0,
        block_size,
        frag_count: 0,
        compressor: Compressor::None,
        block_log,
        flags: 0b0000_0010_0001_0000, // fragments unused, no xattrs
        id_count: 0,
        version_major: 4,
        version_minor: 0,
        root_inode_ref,
        bytes_used: archive.len() as u64,
        id_table_start: NOT_SET,
        xattr_id_table_start: NOT_SET,
        inode_table_start,
        directory_table_start,
        fragment_table_start: NOT_SET,
        export_table_start: NOT_SET,
    };
    let mut sb_bytes = sb.to_bytes().unwrap();
    sb_bytes.resize(96, 0);
    archive[0..96].copy_from_slice(&sb_bytes);
    archive
}

#[test]
fn reads_top_level_file() {
    let archive = Archive::open(build_nested_archive()).unwrap();
    assert_eq!(easy_file_content(&archive, "/a").unwrap(), b"hello world");
}

#[test]
fn reads_nested_file() {
    let archive = Archive::open(build_nested_archive()).unwrap();
    assert_eq!(easy_file_content(&archive, "/sub/b").unwrap(), b"nested");
}

#[test]
fn lists_root_directory() {
    let archive = Archive::open(build_nested_archive()).unwrap();
    let mut names: Vec<_> = easy_directory_list(&archive, "/")
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    names.sort();
    assert_eq!(names, vec![b"a".to_vec(), b"sub".to_vec()]);
}

#[test]
fn existence_checks_follow_paths() {
    let archive = Archive::open(build_nested_archive()).unwrap();
    assert!(easy_file_exists(&archive, "/a"));
    assert!(easy_file_exists(&archive, "/sub/b"));
    assert!(!easy_file_exists(&archive, "/sub/missing"));
    assert!(!easy_file_exists(&archive, "/missing"));
}

#[test]
fn tree_traversal_visits_every_node() {
    let archive = Archive::open(build_nested_archive()).unwrap();
    let root = archive.root_file().unwrap();
    let mut tree = TreeTraversal::new(root).unwrap();

    let mut file_sizes = Vec::new();
    let mut dirs_begun = 0;
    let mut dir_paths = Vec::new();
    loop {
        match tree.next().unwrap() {
            TraversalState::DirectoryBegin => {
                dirs_begun += 1;
                dir_paths.push(tree.path_dup());
            }
            TraversalState::File => file_sizes.push(tree.open_file().unwrap().size()),
            TraversalState::DirectoryEnd => {}
            TraversalState::Done => break,
            TraversalState::Init => unreachable!(),
        }
    }

    assert_eq!(dirs_begun, 2); // root, then sub
    dir_paths.sort();
    assert_eq!(dir_paths, vec![b"/".to_vec(), b"/sub".to_vec()]);

    file_sizes.sort();
    assert_eq!(file_sizes, vec![6, 11]); // "nested" and "hello world"
}
