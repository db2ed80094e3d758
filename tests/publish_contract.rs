// Lifecycle of the process-wide RuntimeDebugHeader symbol.
//
// Publication happens at most once per process, so every step lives in one test.
use rtdebug::api::{
    COOKIE, Capacities, ErrorKind, LocalMemory, MAJOR_VERSION, Reader, RuntimeDebugHeader,
    TABLE_COUNT, TableKind, header, populate, populate_with,
};
use rtdebug::sample::register_sample;

#[test]
fn header_is_published_once_and_only_after_a_clean_pass() {
    let exported = header();
    assert!(std::ptr::eq(exported, &RuntimeDebugHeader));
    assert_eq!(exported.cookie(), COOKIE);
    assert_eq!(exported.major_version(), MAJOR_VERSION);
    assert_eq!(exported.table_count(), 0);
    assert!(exported.directory().is_none());

    let memory = unsafe { LocalMemory::new() };
    let reader = Reader::new(&memory);
    let address = exported.address() as u64;
    assert!(reader.read_header(address).expect("read unpopulated").is_none());

    let tight = Capacities {
        types: 3,
        ..Capacities::default()
    };
    let err = populate_with(tight, register_sample).expect_err("types overflow");
    assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
    assert_eq!(err.table(), Some(TableKind::Type));
    assert_eq!(exported.table_count(), 0);
    assert!(!exported.is_published());

    let published = populate(register_sample).expect("populate");
    assert!(std::ptr::eq(published, exported));
    assert_eq!(exported.table_count(), TABLE_COUNT);
    let directory = exported.directory().expect("directory");
    let counts: Vec<u32> = directory.iter().map(|entry| entry.row_count()).collect();
    assert_eq!(counts, vec![2, 11, 32, 5, 2]);

    let snapshot = reader
        .read_header(address)
        .expect("read populated")
        .expect("published");
    assert_eq!(snapshot.table_count, TABLE_COUNT);
    assert_eq!(snapshot.types[0].name, "ThreadStore");
    assert_eq!(snapshot.base_offset("StringObject", "Object"), Some(0));
    assert_eq!(
        snapshot.field_offset("Thread", "m_Link"),
        Some(std::mem::offset_of!(rtdebug::sample::Thread, link) as u32)
    );

    let again = populate(register_sample).expect_err("second populate");
    assert_eq!(again.kind(), ErrorKind::AlreadyPublished);
    assert_eq!(again.address(), Some(address));
    assert_eq!(exported.table_count(), TABLE_COUNT);
}
