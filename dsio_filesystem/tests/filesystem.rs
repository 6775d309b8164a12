#![allow(missing_docs)]

use std::error::Error;

use dsio_filesystem::{FilesystemStore, FilesystemStoreOptions};
use dsio_storage::{ReadableStorageTraits, StorageError, WritableStorageTraits};

#[test]
#[cfg_attr(miri, ignore)]
fn filesystem() -> Result<(), Box<dyn Error>> {
    let path = tempfile::TempDir::new()?;
    let store = FilesystemStore::new(path.path().join("data.dsio"))?;
    dsio_storage::store_test::store_write(&store)?;
    dsio_storage::store_test::store_read(&store)?;
    Ok(())
}

#[test]
#[cfg_attr(miri, ignore)]
fn filesystem_reopen() -> Result<(), Box<dyn Error>> {
    let path = tempfile::TempDir::new()?;
    let file = path.path().join("nested").join("data.dsio");
    {
        let store = FilesystemStore::new(&file)?;
        store.set_partial(2, &[5, 6])?;
        store.flush()?;
    }

    let mut options = FilesystemStoreOptions::default();
    options.read_only(true);
    let store = FilesystemStore::new_with_options(&file, options)?;
    assert!(store.is_read_only());
    assert_eq!(store.size()?, 4);
    let mut buf = [9u8; 6];
    store.read_into(0, &mut buf)?;
    assert_eq!(buf, [0, 0, 5, 6, 0, 0]);
    assert!(matches!(
        store.set_partial(0, &[1]),
        Err(StorageError::ReadOnly)
    ));

    let mut options = FilesystemStoreOptions::default();
    options.truncate(true);
    let store = FilesystemStore::new_with_options(&file, options)?;
    assert_eq!(store.size()?, 0);
    Ok(())
}

#[test]
fn filesystem_invalid_path() -> Result<(), Box<dyn Error>> {
    let path = tempfile::TempDir::new()?;
    assert!(FilesystemStore::new(path.path()).is_err());
    Ok(())
}
