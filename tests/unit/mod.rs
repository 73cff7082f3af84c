mod merge_properties;
