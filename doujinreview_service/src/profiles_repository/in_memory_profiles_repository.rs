use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::api::{Profile, ProfilePatch, UserId};
use crate::profiles_repository::{ProfilesRepository, ProfilesRepositoryError};

#[derive(Default)]
pub struct InMemoryProfilesRepository {
    profiles: parking_lot::RwLock<HashMap<UserId, Profile>>,
}

#[async_trait::async_trait]
impl ProfilesRepository for InMemoryProfilesRepository {
    async fn create_profile(&self, profile: Profile) -> Result<(), ProfilesRepositoryError> {
        match self.profiles.write().entry(profile.user_id) {
            Entry::Occupied(_) => Err(ProfilesRepositoryError::AlreadyExists(profile.user_id)),
            Entry::Vacant(entry) => {
                entry.insert(profile);
                Ok(())
            }
        }
    }

    async fn get_profile(&self, user_id: UserId) -> Result<Profile, ProfilesRepositoryError> {
        self.profiles
            .read()
            .get(&user_id)
            .cloned()
            .ok_or(ProfilesRepositoryError::NotFound(user_id))
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        patch: ProfilePatch,
    ) -> Result<bool, ProfilesRepositoryError> {
        let mut profiles = self.profiles.write();
        let Some(profile) = profiles.get_mut(&user_id) else {
            return Ok(false);
        };
        if let Some(display_name) = patch.display_name {
            profile.display_name = display_name;
        }
        if let Some(bio) = patch.bio {
            profile.bio = bio;
        }
        Ok(true)
    }

    async fn display_names(
        &self,
        user_ids: &[UserId],
    ) -> Result<HashMap<UserId, String>, ProfilesRepositoryError> {
        let profiles = self.profiles.read();
        Ok(user_ids
            .iter()
            .filter_map(|user_id| {
                profiles
                    .get(user_id)
                    .map(|profile| (*user_id, profile.display_name.clone()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests_in_memory_profiles_repository {
    use crate::api::Role;

    use super::*;

    #[tokio::test]
    async fn test_profile_management() {
        let repository = InMemoryProfilesRepository::default();
        assert!(matches!(
            repository.get_profile(1).await,
            Err(ProfilesRepositoryError::NotFound(1))
        ));

        let profile = Profile {
            user_id: 1,
            display_name: "reader".to_string(),
            bio: String::new(),
            role: Role::User,
        };
        repository.create_profile(profile.clone()).await.unwrap();
        assert!(matches!(
            repository.create_profile(profile.clone()).await,
            Err(ProfilesRepositoryError::AlreadyExists(1))
        ));
        assert_eq!(repository.get_profile(1).await.unwrap(), profile);

        let patch = ProfilePatch {
            bio: Some("I like SF".to_string()),
            ..ProfilePatch::default()
        };
        assert!(repository.update_profile(1, patch).await.unwrap());
        assert!(!repository
            .update_profile(2, ProfilePatch::default())
            .await
            .unwrap());

        let updated = repository.get_profile(1).await.unwrap();
        assert_eq!(updated.display_name, "reader");
        assert_eq!(updated.bio, "I like SF");
        assert_eq!(updated.role, Role::User);

        let names = repository.display_names(&[1, 2]).await.unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names.get(&1).map(String::as_str), Some("reader"));
    }
}
